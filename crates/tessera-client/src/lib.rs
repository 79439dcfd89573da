pub mod actor;
pub mod cleaner;
pub mod http;
pub mod providers;
pub mod twitter;
pub mod web;

pub use actor::ActorBackend;
pub use cleaner::HtmdCleaner;
pub use providers::Providers;
pub use twitter::TwitterBackend;
pub use web::WebBackend;
