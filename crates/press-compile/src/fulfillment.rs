//! Print fulfillment partner contract
//!
//! Payload types only. Placing the order with the partner is up to the
//! caller; this module builds the request and interprets status callbacks.

use crate::job::{CompilationJob, JobStatus};
use crate::types::*;
use press_layout::{CoverBinding, PaperGrade, TrimSize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpec {
    FullColor,
    BlackWhite,
}

impl ColorSpec {
    fn code(self) -> &'static str {
        match self {
            ColorSpec::FullColor => "FC",
            ColorSpec::BlackWhite => "BW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintQuality {
    Standard,
    Premium,
}

impl PrintQuality {
    fn code(self) -> &'static str {
        match self {
            PrintQuality::Standard => "STD",
            PrintQuality::Premium => "PRE",
        }
    }
}

/// Everything the partner needs to pick a product line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub trim_size: TrimSize,
    pub color: ColorSpec,
    pub quality: PrintQuality,
    pub binding: CoverBinding,
    pub paper: PaperGrade,
}

impl PackageSpec {
    /// Partner product code, e.g. `0800X0800FCPRECW080CW`.
    ///
    /// Trim dimensions are in hundredths of an inch.
    pub fn package_id(&self) -> String {
        let (width, height) = self.trim_size.dimensions_in();
        let binding = match self.binding {
            CoverBinding::Hardcover => "CW",
            CoverBinding::Softcover => "PB",
        };
        let paper = match self.paper {
            PaperGrade::Standard => "060UW",
            PaperGrade::Premium => "080CW",
            PaperGrade::Lustre => "100LU",
        };
        format!(
            "{:04}X{:04}{}{}{}{}",
            (width * 100.0).round() as u32,
            (height * 100.0).round() as u32,
            self.color.code(),
            self.quality.code(),
            binding,
            paper
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingLevel {
    Mail,
    Ground,
    Expedited,
    Express,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub postcode: String,
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Order payload handed to the partner's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintOrderRequest {
    /// Our job id; the partner echoes it in webhooks
    pub external_id: String,
    pub package_id: String,
    pub page_count: usize,
    pub quantity: u32,
    pub shipping_address: ShippingAddress,
    pub shipping_level: ShippingLevel,
    pub interior_url: String,
    pub cover_url: String,
}

/// Caller-chosen parts of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOptions {
    pub package: PackageSpec,
    pub quantity: u32,
    pub shipping_address: ShippingAddress,
    pub shipping_level: ShippingLevel,
    /// Storage key of the print-ready cover spread
    pub cover_key: String,
}

/// Build an order for a complete job from already-signed artifact URLs
pub fn build_order_request(
    job: &CompilationJob,
    options: &OrderOptions,
    interior_url: String,
    cover_url: String,
) -> Result<PrintOrderRequest> {
    let JobStatus::Complete { page_count, .. } = &job.status else {
        return Err(CompileError::InvalidRequest(format!(
            "job {} is {}, not complete",
            job.id,
            job.status.name()
        )));
    };
    if options.quantity == 0 {
        return Err(CompileError::InvalidRequest(
            "Order quantity must be at least 1".to_string(),
        ));
    }
    if options.package.trim_size != job.trim_size {
        return Err(CompileError::InvalidRequest(format!(
            "package trim size {} does not match book trim size {}",
            options.package.trim_size, job.trim_size
        )));
    }

    Ok(PrintOrderRequest {
        external_id: job.id.to_string(),
        package_id: options.package.package_id(),
        page_count: *page_count,
        quantity: options.quantity,
        shipping_address: options.shipping_address.clone(),
        shipping_level: options.shipping_level,
        interior_url,
        cover_url,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub carrier: String,
    pub tracking_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
}

/// Status callback as posted by the partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerWebhook {
    /// Partner-side print job id
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub tracking: Option<TrackingInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Created,
    InProduction,
    Shipped { tracking: Option<TrackingInfo> },
    Rejected,
    Canceled,
    Unknown { raw: String },
}

impl PartnerWebhook {
    pub fn fulfillment_status(&self) -> FulfillmentStatus {
        match self.status.to_ascii_uppercase().as_str() {
            "CREATED" | "UNPAID" | "PAYMENT_IN_PROGRESS" => FulfillmentStatus::Created,
            "PRODUCTION_READY" | "PRODUCTION_DELAYED" | "IN_PRODUCTION" => {
                FulfillmentStatus::InProduction
            }
            "SHIPPED" => FulfillmentStatus::Shipped {
                tracking: self.tracking.clone(),
            },
            "REJECTED" | "ERROR" => FulfillmentStatus::Rejected,
            "CANCELED" | "CANCELLED" => FulfillmentStatus::Canceled,
            _ => {
                log::warn!("Unrecognized fulfillment status {:?}", self.status);
                FulfillmentStatus::Unknown {
                    raw: self.status.clone(),
                }
            }
        }
    }
}
