// Device admission
// Enforces the per-identity device cap on login

pub mod controller;

pub use controller::{AdmissionConfig, AdmissionController, AdmissionResult};
