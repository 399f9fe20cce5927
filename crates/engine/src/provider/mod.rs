//! Provider abstraction and the bundled vendor adapters.
//!
//! Each adapter wraps one vendor API behind [`Provider`]. Adapters translate
//! vendor responses into a JSON payload and vendor failures into a
//! [`ProviderError`](crate::errors::ProviderError) whose `retryable` flag is
//! taken from the vendor's signals (HTTP status, transport error).

mod http;
mod traits;

pub mod docusign;
pub mod elasticsearch;
pub mod lob;
pub mod local_storage;
pub mod mailgun;
pub mod sendgrid;

pub use http::DEFAULT_TIMEOUT;
pub use traits::{Provider, ProviderResult};

pub use docusign::DocuSignProvider;
pub use elasticsearch::ElasticsearchProvider;
pub use lob::LobProvider;
pub use local_storage::LocalStorageProvider;
pub use mailgun::MailgunProvider;
pub use sendgrid::SendGridProvider;
