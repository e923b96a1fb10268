pub mod http;
pub mod init;
pub mod metrics;

pub use http::serve as serve_metrics;
pub use init::init_tracing;
pub use metrics::{install as install_metrics, Metrics};
