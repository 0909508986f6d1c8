#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::{Dictionary, Document, Object, Stream};
use press_compile::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const SECRET: &str = "test-secret";
pub const BASE_URL: &str = "https://cdn.test";

/// Build a PDF with `num_pages` pages of the given size in points
pub fn create_test_pdf(num_pages: usize, width: i64, height: i64) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..num_pages {
        let content = format!("q 0 0 0 rg 10 10 {} {} re f Q % page {i}", width / 2, height / 2);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ]),
            ),
            ("Resources", Object::Dictionary(Dictionary::new())),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(num_pages as i64)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", catalog_id);

    doc
}

pub fn pdf_bytes(num_pages: usize, width: i64, height: i64) -> Bytes {
    let mut doc = create_test_pdf(num_pages, width, height);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    Bytes::from(bytes)
}

pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

/// How a page should misbehave in the fake rasterizer
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail this many times, then succeed
    Transient(usize),
    Always,
    /// Answer with something that is not a PDF
    Garbage,
    /// Answer with a PDF header over unparseable content
    Corrupt,
}

/// Rasterizer producing one-page PDFs sized to the requested viewport
#[derive(Default)]
pub struct FakeRasterizer {
    calls: Mutex<HashMap<PageId, usize>>,
    faults: Mutex<HashMap<PageId, Fault>>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, page_id: &str, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .insert(PageId::new(page_id), fault);
    }

    pub fn calls(&self, page_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&PageId::new(page_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        request: RenderRequest,
    ) -> std::result::Result<Bytes, RasterizeError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.page_id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.requests.lock().unwrap().push(request.clone());

        let fault = self.faults.lock().unwrap().get(&request.page_id).copied();
        match fault {
            Some(Fault::Always) => {
                return Err(RasterizeError(format!("page {} timed out", request.page_id)));
            }
            Some(Fault::Transient(n)) if attempt <= n => {
                return Err(RasterizeError("renderer busy".to_string()));
            }
            Some(Fault::Garbage) => return Ok(Bytes::from_static(b"<html>oops</html>")),
            Some(Fault::Corrupt) => return Ok(Bytes::from_static(b"%PDF-1.7 truncated")),
            _ => {}
        }

        let viewport = request.geometry.viewport;
        Ok(pdf_bytes(1, i64::from(viewport.width), i64::from(viewport.height)))
    }
}

/// Content provider over an in-memory page list
pub struct FakeProvider {
    owner: String,
    pages: Mutex<Vec<(PageId, String)>>,
    elements: Mutex<HashMap<PageId, Vec<PageElement>>>,
}

impl FakeProvider {
    pub fn with_pages(count: usize) -> Self {
        let pages = (1..=count)
            .map(|i| (PageId::new(format!("page-{i:03}")), "v1".to_string()))
            .collect();
        Self {
            owner: "Ada Lovelace".to_string(),
            pages: Mutex::new(pages),
            elements: Mutex::new(HashMap::new()),
        }
    }

    pub fn page_id(n: usize) -> String {
        format!("page-{n:03}")
    }

    /// Simulate an edit of one page
    pub fn touch(&self, page_id: &str, version: &str) {
        let mut pages = self.pages.lock().unwrap();
        for (id, v) in pages.iter_mut() {
            if id.as_str() == page_id {
                *v = version.to_string();
            }
        }
    }

    pub fn place(&self, page_id: &str, element: PageElement) {
        self.elements
            .lock()
            .unwrap()
            .entry(PageId::new(page_id))
            .or_default()
            .push(element);
    }
}

#[async_trait]
impl PageContentProvider for FakeProvider {
    async fn list_pages(
        &self,
        _collection_id: &CollectionId,
    ) -> press_compile::Result<Vec<PageId>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn version_marker(
        &self,
        _collection_id: &CollectionId,
        page_id: &PageId,
    ) -> press_compile::Result<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == page_id)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| CompileError::Provider(format!("unknown page {page_id}")))
    }

    async fn elements(
        &self,
        _collection_id: &CollectionId,
        page_id: &PageId,
    ) -> press_compile::Result<Vec<PageElement>> {
        Ok(self
            .elements
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn owner_name(&self, _collection_id: &CollectionId) -> press_compile::Result<String> {
        Ok(self.owner.clone())
    }
}

pub fn text(label: &str, x_in: f64, y_in: f64, width_in: f64, height_in: f64) -> PageElement {
    PageElement {
        kind: ElementKind::Text,
        label: label.to_string(),
        x_in,
        y_in,
        width_in,
        height_in,
    }
}

pub fn image(label: &str, x_in: f64, y_in: f64, width_in: f64, height_in: f64) -> PageElement {
    PageElement {
        kind: ElementKind::Image,
        ..text(label, x_in, y_in, width_in, height_in)
    }
}

pub fn test_config() -> CompileConfig {
    CompileConfig {
        retry: RetryPolicy::immediate(3),
        signing_secret: SECRET.to_string(),
        public_base_url: BASE_URL.to_string(),
        ..Default::default()
    }
}

pub fn signer() -> UrlSigner {
    UrlSigner::new(BASE_URL, SECRET)
}

/// Orchestrator over in-memory backends, with handles to every fake
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: MemoryObjectStore,
    pub jobs: Arc<MemoryJobRepository>,
    pub provider: Arc<FakeProvider>,
    pub rasterizer: Arc<FakeRasterizer>,
}

impl Harness {
    pub fn new(pages: usize) -> Self {
        Self::with_config(pages, test_config())
    }

    pub fn with_config(pages: usize, config: CompileConfig) -> Self {
        let store = MemoryObjectStore::new(signer());
        let jobs = Arc::new(MemoryJobRepository::new());
        let provider = Arc::new(FakeProvider::with_pages(pages));
        let rasterizer = Arc::new(FakeRasterizer::new());
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(store.clone()),
            jobs.clone(),
            provider.clone(),
            rasterizer.clone(),
        )
        .unwrap();
        Self {
            orchestrator,
            store,
            jobs,
            provider,
            rasterizer,
        }
    }

    /// Request a compile and render every batch, stopping short of the merge
    pub async fn render_all(&self, request: CompileRequest) -> JobId {
        let response = self.orchestrator.request_compile(request).await.unwrap();
        let CompileResponse::Accepted { mut trigger, .. } = response else {
            panic!("expected accepted, got {response:?}");
        };
        loop {
            match self.orchestrator.process_batch(trigger).await.unwrap() {
                BatchOutcome::Next(next) => trigger = next,
                BatchOutcome::ReadyToMerge(job_id) => return job_id,
                other => panic!("rendering stopped with {other:?}"),
            }
        }
    }

    /// Request a compile and drive it to the end
    pub async fn compile(&self, request: CompileRequest) -> (CompileResponse, CompilationJob) {
        let response = self.orchestrator.request_compile(request).await.unwrap();
        let job = match &response {
            CompileResponse::Accepted { trigger, .. } => {
                self.orchestrator.run_to_completion(*trigger).await.unwrap()
            }
            CompileResponse::Cached { job_id, .. } => self.orchestrator.job(job_id).await.unwrap(),
        };
        (response, job)
    }
}
