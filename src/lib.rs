//! Tutor web API backed by a local LLM - Library exports for testing

pub mod api;
pub mod core;
pub mod infrastructure;

use crate::core::client::InferenceClient;
use crate::core::offload::OffloadBridge;
use crate::core::services::MyTutorService;
use crate::infrastructure::settings::Settings;
use di::{Injectable, Ref, ServiceCollection, singleton_factory};

/// Registers everything the API needs except the language model backend.
///
/// The bridge is created by the caller so it can be shut down once the
/// server has stopped.
pub fn services(settings: Settings, bridge: Ref<OffloadBridge>) -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add(singleton_factory(move |_| Ref::new(settings.clone())))
        .add(singleton_factory(move |_| bridge.clone()))
        .add(InferenceClient::singleton())
        .add(MyTutorService::scoped());
    services
}
