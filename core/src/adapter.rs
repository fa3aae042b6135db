//! Call adaptation by declared return shape.
//!
//! Each endpoint declares the shape its calls return. When a service is bound,
//! the gateway asks its adapter factories in order which one handles that
//! shape. The outcome adapter claims `Outcome` shapes and wraps their calls in
//! `ResultCall`; plain `Call` shapes fall through to the default adapter and
//! are passed on unmodified. A shape nobody claims is a configuration error.

use std::any::type_name;
use std::fmt;

use tracing::{debug, trace};

use crate::error::ConfigError;

/// What an endpoint declares its calls return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// `ResultCall<T>`: a pending outcome of `T`.
    Outcome { payload: &'static str },
    /// `Call<T>`: a plain pending call of `T`.
    Call { payload: &'static str },
    /// A value with no pending-call wrapper. No adapter supports it.
    Bare { payload: &'static str },
}

impl ReturnShape {
    pub fn outcome<T>() -> Self {
        ReturnShape::Outcome {
            payload: type_name::<T>(),
        }
    }

    pub fn call<T>() -> Self {
        ReturnShape::Call {
            payload: type_name::<T>(),
        }
    }

    pub fn bare<T>() -> Self {
        ReturnShape::Bare {
            payload: type_name::<T>(),
        }
    }

    pub fn payload(&self) -> &'static str {
        match self {
            ReturnShape::Outcome { payload }
            | ReturnShape::Call { payload }
            | ReturnShape::Bare { payload } => payload,
        }
    }
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnShape::Outcome { payload } => write!(f, "ResultCall<{payload}>"),
            ReturnShape::Call { payload } => write!(f, "Call<{payload}>"),
            ReturnShape::Bare { payload } => f.write_str(payload),
        }
    }
}

/// How calls of an endpoint are handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adaptation {
    /// Wrapped in `ResultCall`.
    Outcome,
    /// Returned as the plain `Call`.
    PassThrough,
}

impl Adaptation {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Adaptation::Outcome => "an outcome endpoint",
            Adaptation::PassThrough => "a plain call endpoint",
        }
    }
}

/// Decides whether it handles a declared return shape.
pub trait CallAdapterFactory: Send + Sync {
    /// `None` lets the next factory try.
    fn adapt(&self, shape: &ReturnShape) -> Option<Adaptation>;
}

/// Claims `Outcome` shapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkResultCallAdapterFactory;

impl CallAdapterFactory for NetworkResultCallAdapterFactory {
    fn adapt(&self, shape: &ReturnShape) -> Option<Adaptation> {
        match shape {
            ReturnShape::Outcome { payload } => {
                debug!(payload, "adapting to network result");
                Some(Adaptation::Outcome)
            }
            other => {
                trace!(shape = %other, "not a network result, skipping");
                None
            }
        }
    }
}

/// Claims plain `Call` shapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCallAdapterFactory;

impl CallAdapterFactory for DefaultCallAdapterFactory {
    fn adapt(&self, shape: &ReturnShape) -> Option<Adaptation> {
        matches!(shape, ReturnShape::Call { .. }).then_some(Adaptation::PassThrough)
    }
}

/// Ask each factory in order; the first claim wins.
pub fn resolve(
    factories: &[Box<dyn CallAdapterFactory>],
    endpoint: &str,
    shape: &ReturnShape,
) -> Result<Adaptation, ConfigError> {
    factories
        .iter()
        .find_map(|factory| factory.adapt(shape))
        .ok_or_else(|| ConfigError::UnsupportedReturnShape {
            endpoint: endpoint.to_string(),
            shape: shape.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Vec<Box<dyn CallAdapterFactory>> {
        vec![
            Box::new(NetworkResultCallAdapterFactory),
            Box::new(DefaultCallAdapterFactory),
        ]
    }

    #[test]
    fn outcome_shape_is_adapted() {
        let shape = ReturnShape::outcome::<String>();
        assert_eq!(
            resolve(&registry(), "e", &shape).unwrap(),
            Adaptation::Outcome
        );
    }

    #[test]
    fn call_shape_passes_through() {
        let shape = ReturnShape::call::<u32>();
        assert_eq!(NetworkResultCallAdapterFactory.adapt(&shape), None);
        assert_eq!(
            resolve(&registry(), "e", &shape).unwrap(),
            Adaptation::PassThrough
        );
    }

    #[test]
    fn bare_shape_is_rejected() {
        let shape = ReturnShape::bare::<u32>();
        let err = resolve(&registry(), "get_count", &shape).unwrap_err();
        match err {
            ConfigError::UnsupportedReturnShape { endpoint, shape } => {
                assert_eq!(endpoint, "get_count");
                assert_eq!(shape, "u32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shapes_display_their_wrapper() {
        assert_eq!(
            ReturnShape::outcome::<u8>().to_string(),
            "ResultCall<u8>"
        );
        assert_eq!(ReturnShape::call::<u8>().to_string(), "Call<u8>");
        assert_eq!(ReturnShape::call::<u8>().payload(), "u8");
    }
}
