pub mod compatible;
pub mod http_client;
pub mod json;
pub mod scrub;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use json::{chat_json, extract_json};
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns, scrubbed_prefix};
pub use traits::Provider;
