//! HTTP request handlers.

pub mod change_requests;
pub mod health;

pub use change_requests::{
    apply_change_request, approve_change_request, create_change_request, get_change_request,
};
pub use health::health_check;
