mod router;
mod server;

pub use router::app_router;
pub use server::serve;
