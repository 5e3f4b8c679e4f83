//! Test doubles for the shipment store and payment gateway, plus row fixtures.

mod fake_gateway;
pub mod fixtures;
mod memory_store;

pub use fake_gateway::{FakeGateway, FakeGatewayMode, FAKE_NOTICE_SIGNATURE};
pub use fixtures::{otp_time, shipment, ShipmentBuilder};
pub use memory_store::InMemoryShipmentStore;
