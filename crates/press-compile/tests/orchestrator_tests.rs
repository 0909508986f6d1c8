mod common;

use common::*;
use press_compile::*;
use std::sync::Arc;

fn request(pages: Option<Vec<String>>) -> CompileRequest {
    CompileRequest {
        page_ids: pages,
        ..CompileRequest::new("summer-2024", "8x8")
    }
}

#[tokio::test]
async fn test_full_pipeline_produces_even_book() {
    let harness = Harness::new(21);
    let (response, job) = harness.compile(request(None)).await;

    assert_eq!(response.http_status(), 202);
    match response {
        CompileResponse::Accepted {
            estimated_minutes, ..
        } => assert_eq!(estimated_minutes, 3),
        other => panic!("expected accepted, got {other:?}"),
    }

    let JobStatus::Complete {
        artifact_key,
        page_count: pages,
        size_bytes,
        download_url,
        ..
    } = &job.status
    else {
        panic!("job ended as {:?}", job.status);
    };
    assert_eq!(*pages, 22);
    assert!(artifact_key.starts_with(&format!("books/{}/8x8/", job.fingerprint)));
    assert_eq!(signer().verify_url(download_url, chrono::Utc::now()).as_ref(), Some(artifact_key));

    let bytes = harness.store.get(artifact_key).await.unwrap();
    assert_eq!(bytes.len() as u64, *size_bytes);
    assert_eq!(page_count(&bytes), 22);
    assert_eq!(harness.rasterizer.total_calls(), 21);

    // pending, rendering 0..=4, merging, complete
    assert_eq!(job.revision, 7);
}

#[tokio::test]
async fn test_explicit_page_order_is_respected() {
    let harness = Harness::new(4);
    let order = vec![FakeProvider::page_id(3), FakeProvider::page_id(1)];
    let (_, job) = harness.compile(request(Some(order))).await;

    let ids: Vec<&str> = job.pages.iter().map(|p| p.page_id.as_str()).collect();
    assert_eq!(ids, vec!["page-003", "page-001"]);
    assert_eq!(harness.rasterizer.calls(&FakeProvider::page_id(2)), 0);
}

#[tokio::test]
async fn test_unchanged_content_short_circuits() {
    let harness = Harness::new(6);
    let (_, first) = harness.compile(request(None)).await;
    let renders = harness.rasterizer.total_calls();

    let response = harness
        .orchestrator
        .request_compile(request(None))
        .await
        .unwrap();
    assert_eq!(response.http_status(), 200);
    match response {
        CompileResponse::Cached {
            job_id,
            download_url,
        } => {
            assert_eq!(job_id, first.id);
            assert!(signer().verify_url(&download_url, chrono::Utc::now()).is_some());
        }
        other => panic!("expected cached, got {other:?}"),
    }
    assert_eq!(harness.rasterizer.total_calls(), renders);
    assert_eq!(harness.jobs.len(), 1);
}

#[tokio::test]
async fn test_force_recompile_writes_new_artifact() {
    let harness = Harness::new(2);
    let (_, first) = harness.compile(request(None)).await;

    let forced = CompileRequest {
        force_recompile: true,
        ..request(None)
    };
    let (_, second) = harness.compile(forced).await;

    assert_ne!(first.id, second.id);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_ne!(first.storage_key(), second.storage_key());
    // Fragments were cached, only the merge reran
    assert_eq!(harness.rasterizer.total_calls(), 2);
    assert!(harness.store.get(&first.storage_key()).await.is_ok());
    assert!(harness.store.get(&second.storage_key()).await.is_ok());
}

#[tokio::test]
async fn test_edited_page_is_the_only_rerender() {
    let harness = Harness::new(8);
    let (_, first) = harness.compile(request(None)).await;
    assert_eq!(harness.rasterizer.total_calls(), 8);

    let edited = FakeProvider::page_id(5);
    harness.provider.touch(&edited, "v2");
    let (response, second) = harness.compile(request(None)).await;

    assert!(matches!(response, CompileResponse::Accepted { .. }));
    assert_ne!(first.fingerprint, second.fingerprint);
    assert_eq!(harness.rasterizer.total_calls(), 9);
    assert_eq!(harness.rasterizer.calls(&edited), 2);
    assert!(matches!(second.status, JobStatus::Complete { .. }));
}

#[tokio::test]
async fn test_exhausted_page_fails_job() {
    let harness = Harness::new(7);
    let bad = FakeProvider::page_id(6);
    harness.rasterizer.fail(&bad, Fault::Always);

    let (_, job) = harness.compile(request(None)).await;
    match &job.status {
        JobStatus::Failed {
            stage,
            failed_page_id,
            message,
        } => {
            assert_eq!(*stage, FailureStage::Render);
            assert_eq!(failed_page_id.as_ref().map(PageId::as_str), Some(bad.as_str()));
            assert!(message.contains(&bad));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(harness.rasterizer.calls(&bad), 3);
    // Page 7 is after the failure and never rendered
    assert_eq!(harness.rasterizer.calls(&FakeProvider::page_id(7)), 0);

    // Failed jobs never resume
    let resumed = harness.orchestrator.resume(&job.id).await.unwrap();
    assert_eq!(resumed.revision, job.revision);
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let harness = Harness::new(3);
    harness
        .rasterizer
        .fail(&FakeProvider::page_id(2), Fault::Transient(2));

    let (_, job) = harness.compile(request(None)).await;
    assert!(matches!(job.status, JobStatus::Complete { page_count: 4, .. }));
}

#[tokio::test]
async fn test_duplicate_and_stale_triggers_are_skipped() {
    let harness = Harness::new(12);
    let response = harness
        .orchestrator
        .request_compile(request(None))
        .await
        .unwrap();
    let CompileResponse::Accepted { trigger, .. } = response else {
        panic!("expected accepted");
    };

    let outcome = harness.orchestrator.process_batch(trigger).await.unwrap();
    let BatchOutcome::Next(next) = outcome else {
        panic!("expected next batch, got {outcome:?}");
    };
    assert_eq!(next.batch_index, 1);

    // Redelivery of batch 0
    let replay = harness.orchestrator.process_batch(trigger).await.unwrap();
    assert_eq!(replay, BatchOutcome::Skipped);

    // A trigger from the future
    let ahead = BatchTrigger {
        batch_index: 2,
        ..trigger
    };
    assert_eq!(
        harness.orchestrator.process_batch(ahead).await.unwrap(),
        BatchOutcome::Skipped
    );

    assert_eq!(harness.rasterizer.total_calls(), 5);
    let job = harness.orchestrator.job(&trigger.job_id).await.unwrap();
    assert_eq!(job.current_batch(), Some(1));
    assert_eq!(job.pages_rendered(), 5);
}

#[tokio::test]
async fn test_merge_only_runs_from_merging() {
    let harness = Harness::new(2);
    let response = harness
        .orchestrator
        .request_compile(request(None))
        .await
        .unwrap();
    let job_id = response.job_id();

    assert_eq!(
        harness.orchestrator.merge_job(&job_id).await.unwrap(),
        MergeOutcome::Skipped
    );
    assert!(matches!(
        harness.orchestrator.download_url(&job_id).await,
        Err(CompileError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_critical_violation_blocks_until_acknowledged() {
    let harness = Harness::new(3);
    // Caption hugging the trim edge
    harness
        .provider
        .place(&FakeProvider::page_id(2), text("caption", 0.1, 7.5, 3.0, 0.3));

    let blocked = harness.orchestrator.request_compile(request(None)).await;
    match blocked {
        Err(err @ CompileError::ValidationBlocked(_)) => {
            assert_eq!(err.http_status(), 422);
            if let CompileError::ValidationBlocked(violations) = err {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].element, "caption");
            }
        }
        other => panic!("expected validation block, got {other:?}"),
    }
    assert!(harness.jobs.is_empty());

    let acknowledged = CompileRequest {
        acknowledge_warnings: true,
        ..request(None)
    };
    let (_, job) = harness.compile(acknowledged).await;
    assert!(matches!(job.status, JobStatus::Complete { .. }));
}

#[tokio::test]
async fn test_warnings_do_not_block() {
    let harness = Harness::new(2);
    harness
        .provider
        .place(&FakeProvider::page_id(1), image("photo", 0.2, 0.2, 4.0, 4.0));

    let (response, _) = harness.compile(request(None)).await;
    assert!(matches!(response, CompileResponse::Accepted { .. }));
}

#[tokio::test]
async fn test_invalid_requests() {
    let harness = Harness::new(2);

    let bad_trim = harness
        .orchestrator
        .request_compile(CompileRequest::new("summer-2024", "9x9"))
        .await;
    match bad_trim {
        Err(err) => {
            assert!(matches!(err, CompileError::InvalidTrimSize(_)));
            assert_eq!(err.http_status(), 400);
        }
        Ok(response) => panic!("unexpected {response:?}"),
    }

    let empty = harness
        .orchestrator
        .request_compile(request(Some(Vec::new())))
        .await;
    assert!(matches!(empty, Err(CompileError::InvalidRequest(_))));

    let unknown = JobId::new();
    assert!(matches!(
        harness.orchestrator.job(&unknown).await,
        Err(CompileError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_storage_outage_pauses_then_resumes() {
    let harness = Harness::new(7);
    let response = harness
        .orchestrator
        .request_compile(request(None))
        .await
        .unwrap();
    let CompileResponse::Accepted { trigger, .. } = response else {
        panic!("expected accepted");
    };

    harness.store.inject_failure("pages/");
    let result = harness.orchestrator.process_batch(trigger).await;
    assert!(matches!(result, Err(CompileError::Storage(_))));

    let job = harness.orchestrator.job(&trigger.job_id).await.unwrap();
    assert_eq!(job.current_batch(), Some(0));

    harness.store.clear_failures();
    let job = harness.orchestrator.resume(&trigger.job_id).await.unwrap();
    assert!(matches!(job.status, JobStatus::Complete { page_count: 8, .. }));
}

#[tokio::test]
async fn test_immutability_violation_fails_job() {
    let harness = Harness::new(2);
    let response = harness
        .orchestrator
        .request_compile(request(None))
        .await
        .unwrap();
    let CompileResponse::Accepted { trigger, .. } = response else {
        panic!("expected accepted");
    };
    let outcome = harness.orchestrator.process_batch(trigger).await.unwrap();
    assert_eq!(outcome, BatchOutcome::ReadyToMerge(trigger.job_id));

    // Someone else already wrote to this job's address
    let job = harness.orchestrator.job(&trigger.job_id).await.unwrap();
    harness
        .orchestrator
        .store()
        .commit_book(&job.storage_key(), pdf_bytes(1, 10, 10), ObjectMetadata::pdf())
        .await
        .unwrap();

    let result = harness.orchestrator.merge_job(&trigger.job_id).await;
    assert!(matches!(result, Err(CompileError::ImmutabilityViolation { .. })));

    let job = harness.orchestrator.job(&trigger.job_id).await.unwrap();
    assert!(matches!(
        job.status,
        JobStatus::Failed {
            stage: FailureStage::Merge,
            ..
        }
    ));
}

#[tokio::test]
async fn test_filesystem_backends_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::with_pages(6));
    let build = |rasterizer: Arc<FakeRasterizer>| {
        Orchestrator::new(
            test_config(),
            Arc::new(FsObjectStore::new(dir.path().join("store"), signer())),
            Arc::new(FsJobRepository::new(dir.path().join("jobs"))),
            provider.clone(),
            rasterizer,
        )
        .unwrap()
    };

    let first_rasterizer = Arc::new(FakeRasterizer::new());
    let first = build(first_rasterizer.clone());
    let response = first.request_compile(request(None)).await.unwrap();
    let CompileResponse::Accepted { trigger, .. } = response else {
        panic!("expected accepted");
    };
    assert!(matches!(
        first.process_batch(trigger).await.unwrap(),
        BatchOutcome::Next(_)
    ));
    drop(first);

    // New process, same directories
    let second_rasterizer = Arc::new(FakeRasterizer::new());
    let second = build(second_rasterizer.clone());
    let job = second.resume(&trigger.job_id).await.unwrap();
    assert!(matches!(job.status, JobStatus::Complete { page_count: 6, .. }));
    assert_eq!(first_rasterizer.total_calls(), 5);
    assert_eq!(second_rasterizer.total_calls(), 1);

    let cached = second.request_compile(request(None)).await.unwrap();
    assert!(matches!(cached, CompileResponse::Cached { .. }));
}

#[tokio::test]
async fn test_print_order_uses_long_lived_urls() {
    use press_compile::fulfillment::*;
    use press_layout::{CoverBinding, PaperGrade, TrimSize};

    let harness = Harness::new(4);
    let (_, job) = harness.compile(request(None)).await;

    let cover_key = "covers/summer-2024/8x8.pdf";
    harness
        .orchestrator
        .store()
        .commit_book(cover_key, pdf_bytes(1, 100, 100), ObjectMetadata::pdf())
        .await
        .unwrap();

    let options = OrderOptions {
        package: PackageSpec {
            trim_size: TrimSize::Square8,
            color: ColorSpec::FullColor,
            quality: PrintQuality::Premium,
            binding: CoverBinding::Hardcover,
            paper: PaperGrade::Premium,
        },
        quantity: 2,
        shipping_address: ShippingAddress {
            name: "Ada Lovelace".to_string(),
            street1: "12 St James's Square".to_string(),
            street2: None,
            city: "London".to_string(),
            state_code: None,
            postcode: "SW1Y 4JH".to_string(),
            country_code: "GB".to_string(),
            phone_number: None,
        },
        shipping_level: ShippingLevel::Ground,
        cover_key: cover_key.to_string(),
    };

    let order = harness
        .orchestrator
        .prepare_print_order(&job.id, &options)
        .await
        .unwrap();
    assert_eq!(order.external_id, job.id.to_string());
    assert_eq!(order.page_count, 4);
    assert_eq!(order.package_id, "0800X0800FCPRECW080CW");

    // Still valid after the 1h download window, gone after a day
    let in_two_hours = chrono::Utc::now() + chrono::Duration::hours(2);
    let in_two_days = chrono::Utc::now() + chrono::Duration::days(2);
    assert!(signer().verify_url(&order.interior_url, in_two_hours).is_some());
    assert!(signer().verify_url(&order.cover_url, in_two_hours).is_some());
    assert!(signer().verify_url(&order.interior_url, in_two_days).is_none());

    let handoff = harness.orchestrator.fulfillment_url(&job.id).await.unwrap();
    assert_eq!(
        signer().verify_url(&handoff, in_two_hours),
        Some(job.storage_key())
    );

    let wrong_size = OrderOptions {
        package: PackageSpec {
            trim_size: TrimSize::Square12,
            ..options.package
        },
        ..options.clone()
    };
    assert!(matches!(
        harness
            .orchestrator
            .prepare_print_order(&job.id, &wrong_size)
            .await,
        Err(CompileError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_preflight_enforcement_can_be_disabled() {
    let config = CompileConfig {
        enforce_preflight: false,
        ..test_config()
    };
    let harness = Harness::with_config(2, config);
    harness
        .provider
        .place(&FakeProvider::page_id(1), text("title", -0.5, 0.0, 2.0, 0.5));

    let (response, _) = harness.compile(request(None)).await;
    assert!(matches!(response, CompileResponse::Accepted { .. }));
}

#[tokio::test]
async fn test_unparseable_fragment_fails_merge() {
    let harness = Harness::new(3);
    harness
        .rasterizer
        .fail(&FakeProvider::page_id(2), Fault::Corrupt);
    let job_id = harness.render_all(request(None)).await;

    let outcome = harness.orchestrator.merge_job(&job_id).await.unwrap();
    let MergeOutcome::Failed { message, .. } = outcome else {
        panic!("expected failed merge, got {outcome:?}");
    };
    assert!(message.starts_with("Merge failed"), "{message}");

    let job = harness.orchestrator.job(&job_id).await.unwrap();
    match job.status {
        JobStatus::Failed {
            stage: FailureStage::Merge,
            failed_page_id: None,
            message: stored,
        } => assert_eq!(stored, message),
        other => panic!("job ended as {other:?}"),
    }
    assert!(harness.store.keys().iter().all(|key| !key.starts_with("books/")));
}

#[tokio::test]
async fn test_storage_error_during_merge_fails_job() {
    let harness = Harness::new(3);
    let job_id = harness.render_all(request(None)).await;

    harness.store.inject_failure("pages/");
    let result = harness.orchestrator.merge_job(&job_id).await;
    assert!(matches!(result, Err(CompileError::Storage(_))));

    let job = harness.orchestrator.job(&job_id).await.unwrap();
    match job.status {
        JobStatus::Failed {
            stage: FailureStage::Merge,
            failed_page_id: None,
            message,
        } => assert!(message.starts_with("Merge failed"), "{message}"),
        other => panic!("job ended as {other:?}"),
    }

    // Terminal: resuming does not retry
    harness.store.clear_failures();
    let job = harness.orchestrator.resume(&job_id).await.unwrap();
    assert!(matches!(job.status, JobStatus::Failed { .. }));
}

#[tokio::test]
async fn test_book_committed_before_crash_is_published() {
    let harness = Harness::new(3);
    let job_id = harness.render_all(request(None)).await;
    let job = harness.orchestrator.job(&job_id).await.unwrap();

    // The book reached storage but the process died before recording it
    let book = pdf_bytes(4, 594, 594);
    let metadata = ObjectMetadata::pdf()
        .with_attribute("job_id", job_id.to_string())
        .with_attribute("page_count", "4")
        .with_attribute("size_bytes", book.len().to_string());
    harness
        .orchestrator
        .store()
        .commit_book(&job.storage_key(), book.clone(), metadata)
        .await
        .unwrap();

    let job = harness.orchestrator.resume(&job_id).await.unwrap();
    let JobStatus::Complete {
        artifact_key,
        size_bytes,
        page_count,
        ..
    } = &job.status
    else {
        panic!("job ended as {:?}", job.status);
    };
    assert_eq!(*page_count, 4);
    assert_eq!(*size_bytes, book.len() as u64);
    assert_eq!(harness.store.get(artifact_key).await.unwrap(), book);
}

#[tokio::test]
async fn test_resume_starts_pending_job() {
    let harness = Harness::new(3);
    let collection = CollectionId::new("summer-2024");
    let pages: Vec<PageRef> = (1..=3)
        .map(|i| PageRef::new(FakeProvider::page_id(i), "v1"))
        .collect();
    let trim_size = press_layout::TrimSize::Square8;
    let fingerprint = press_compile::fingerprint::content_hash(&collection, &pages, trim_size);
    let job = CompilationJob::new(
        collection,
        "Ada Lovelace",
        trim_size,
        true,
        pages,
        fingerprint,
    );
    harness.jobs.insert(&job).await.unwrap();

    let resumed = harness.orchestrator.resume(&job.id).await.unwrap();
    assert!(matches!(resumed.status, JobStatus::Complete { page_count: 4, .. }));
    assert_eq!(harness.rasterizer.total_calls(), 3);

    // Already started: nothing left to start
    assert_eq!(harness.orchestrator.start_job(&job.id).await.unwrap(), None);
}
