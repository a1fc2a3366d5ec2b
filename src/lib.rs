//! MQTT connection adapter for pub/sub applications.
//!
//! This crate upgrades a byte-stream transport into a [`Connection`] that
//! speaks MQTT 3.1.1 on the wire and typed pub/sub events to the
//! application. The [`codec`] module adapts `mqttbytes` framing, the
//! [`connection`] module the translation, and [`server`] a small TCP host
//! that relays publishes between connected clients.

pub mod codec;
pub mod connection;
pub mod server;

pub use connection::{Ack, Connection, ConnectionError, Event, PublishOptions};
