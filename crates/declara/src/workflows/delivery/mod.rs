//! Physical document (plate, card) handover after payment.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{AlreadyCompleted, DeliveryId, DeliveryRecord, DeliveryStatus};
pub use repository::DeliveryRepository;
pub use router::delivery_router;
pub use service::{DeliveryService, DeliveryServiceError};
