//! Operation handlers shipped with the gateway

pub mod put_cert;
pub mod server_info;
pub mod static_text;

pub use put_cert::PutCertHandler;
pub use server_info::ServerInfoHandler;
pub use static_text::StaticTextHandler;
