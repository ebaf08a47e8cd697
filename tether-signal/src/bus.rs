//! Named function registry.
//!
//! A [`FunctionBus`] maps `(function type, name)` to the functions
//! registered under it, letting loosely coupled components publish and look
//! up callables without sharing types beyond the function signature.

use crate::error::BusError;
use core::any::{Any, TypeId, type_name};
use foldhash::fast::FixedState;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

type Functions = Vec<Box<dyn Any + Send + Sync>>;
type ByName = HashMap<String, Functions, FixedState>;

/// Registry of named functions, keyed by name and function type.
///
/// The same name may be registered with different types independently.
/// Registering the same `(type, name)` twice keeps both; lookups return
/// the first.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tether_signal::FunctionBus;
///
/// type Scale = Arc<dyn Fn(f64) -> f64 + Send + Sync>;
///
/// let bus = FunctionBus::new();
/// bus.register::<Scale>("double", Arc::new(|x: f64| x * 2.0));
///
/// let double = bus.get::<Scale>("double").unwrap();
/// assert_eq!(double(1.5), 3.0);
/// assert!(bus.get::<Scale>("triple").is_err());
/// ```
#[derive(Default)]
pub struct FunctionBus {
    functions: RwLock<HashMap<TypeId, ByName, FixedState>>,
}

impl FunctionBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `name`.
    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Any + Clone + Send + Sync,
    {
        let name = name.into();
        let mut functions = self.functions.write();
        let list = functions
            .entry(TypeId::of::<F>())
            .or_default()
            .entry(name)
            .or_default();
        list.push(Box::new(function));
        if list.len() > 1 {
            warn!(
                type_name = type_name::<F>(),
                registered = list.len(),
                "function registered more than once under the same name"
            );
        }
    }

    /// Returns a clone of the first function of type `F` registered under
    /// `name`.
    pub fn get<F>(&self, name: &str) -> Result<F, BusError>
    where
        F: Any + Clone,
    {
        let functions = self.functions.read();
        let found = functions
            .get(&TypeId::of::<F>())
            .and_then(|by_name| by_name.get(name))
            .and_then(|list| list.first())
            .and_then(|function| function.downcast_ref::<F>());
        match found {
            Some(function) => Ok(function.clone()),
            None => {
                warn!(name, type_name = type_name::<F>(), "function not registered");
                Err(BusError::NotRegistered {
                    name: name.to_owned(),
                    type_name: type_name::<F>(),
                })
            }
        }
    }

    /// Number of functions of type `F` registered under `name`.
    pub fn count<F: Any>(&self, name: &str) -> usize {
        self.functions
            .read()
            .get(&TypeId::of::<F>())
            .and_then(|by_name| by_name.get(name))
            .map_or(0, Vec::len)
    }
}
