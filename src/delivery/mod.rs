//! Resilient batch delivery to the remote search service.
//!
//! This module owns everything between a sized chunk and the wire: the
//! transport boundary, per-run host health, the sequential failover loop,
//! and the subdivision used by the failed-chunk resend pass.

mod client;
mod hosts;
mod resend;
mod transport;

pub use client::{DeliveryClient, DeliveryOutcome};
pub use hosts::HostPool;
pub use resend::subdivide;
pub use transport::{DeliveryTransport, HttpTransport, TransportRequest, TransportResponse};
