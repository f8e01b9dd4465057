//! Dynamic function invocation
//!
//! Plugins hand the core opaque callables; the core supplies every input
//! those callables declare by resolving against a vector of typed and named
//! argument values, falling back to a mapper chain that can derive missing
//! values from the ones present. Resolution is deterministic: typed entries
//! match by exact type (latest entry wins), named entries match by name, and
//! mappers are consulted in order only for inputs nothing else satisfied.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::errors::ErrorList;

/// A value supplied to a dynamic call.
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// Opaque return value of a dynamic call.
pub type DynamicValue = Box<dyn Any + Send + Sync>;

/// Errors raised while resolving or invoking a dynamic function.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No supplied or mapped argument satisfies a declared input.
    #[error("no argument satisfies input {0}")]
    ArgumentUnsatisfied(String),

    /// Composite of every unsatisfied input for one call.
    #[error("argument resolution failed: {0}")]
    Resolution(ErrorList),

    /// The function returned a value of an unexpected type.
    #[error("unexpected return type, expected {expected}")]
    TypeMismatch { expected: &'static str },

    /// A resolved argument was requested at an out-of-range position.
    #[error("argument index {0} out of range")]
    ArgumentIndex(usize),

    /// Failure raised by the function body, passed through verbatim.
    #[error("{0}")]
    Call(Box<dyn std::error::Error + Send + Sync>),
}

impl InvokeError {
    /// Wrap an arbitrary plugin failure.
    pub fn call<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        InvokeError::Call(Box::new(err))
    }

    /// Wrap a plain message as a plugin failure.
    pub fn message(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        InvokeError::Call(msg.into())
    }
}

/// One input declared by a dynamic function.
#[derive(Debug, Clone)]
pub enum ArgRequest {
    /// Satisfied by any argument of the exact type.
    Typed { id: TypeId, label: &'static str },
    /// Satisfied by an argument registered under the name.
    Named(String),
}

impl ArgRequest {
    pub fn typed<T: Any>() -> Self {
        ArgRequest::Typed {
            id: TypeId::of::<T>(),
            label: std::any::type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        ArgRequest::Named(name.into())
    }

    fn satisfies(&self, requested: &ArgRequest) -> bool {
        match (requested, self) {
            (ArgRequest::Typed { id, .. }, ArgRequest::Typed { id: other, .. }) => id == other,
            (ArgRequest::Named(name), ArgRequest::Named(other)) => name == other,
            _ => false,
        }
    }
}

impl fmt::Display for ArgRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgRequest::Typed { label, .. } => write!(f, "typed({})", label),
            ArgRequest::Named(name) => write!(f, "named({})", name),
        }
    }
}

/// Ordered vector of typed and named argument values for one call.
#[derive(Clone, Default)]
pub struct CallArgs {
    typed: Vec<(TypeId, &'static str, ArgValue)>,
    named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a typed argument. Later entries shadow earlier ones of the
    /// same type.
    pub fn typed<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.typed
            .push((TypeId::of::<T>(), std::any::type_name::<T>(), Arc::new(value)));
        self
    }

    /// Append a named argument.
    pub fn named<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.named.push((name.into(), Arc::new(value)));
        self
    }

    /// Look up the latest typed entry of type `T`.
    pub fn get_typed<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.find_typed(TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
    }

    fn find_typed(&self, id: TypeId) -> Option<ArgValue> {
        self.typed
            .iter()
            .rev()
            .find(|(tid, _, _)| *tid == id)
            .map(|(_, _, v)| v.clone())
    }

    fn find_named(&self, name: &str) -> Option<ArgValue> {
        self.named
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn find_named_of_type(&self, id: TypeId) -> Option<ArgValue> {
        self.named
            .iter()
            .rev()
            .find(|(_, v)| (**v).type_id() == id)
            .map(|(_, v)| v.clone())
    }
}

impl fmt::Debug for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallArgs")
            .field("typed", &self.typed.iter().map(|(_, l, _)| *l).collect::<Vec<_>>())
            .field("named", &self.named.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

/// Arguments resolved into the positions a function declared them in.
pub struct ResolvedArgs {
    values: Vec<ArgValue>,
}

impl ResolvedArgs {
    /// Fetch the resolved argument at `index` as `T`.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, InvokeError> {
        let value = self
            .values
            .get(index)
            .ok_or(InvokeError::ArgumentIndex(index))?;
        value.clone().downcast::<T>().map_err(|_| InvokeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    }
}

/// A callable with declared inputs, invokable by the resolver.
#[async_trait]
pub trait DynamicFunc: Send + Sync {
    /// Inputs this function must be supplied, in positional order.
    fn inputs(&self) -> Vec<ArgRequest>;

    /// Invoke with arguments resolved into declaration order.
    async fn invoke(&self, args: ResolvedArgs) -> Result<DynamicValue, InvokeError>;
}

/// Derives an argument value from the ones already present.
pub trait ArgMapper: Send + Sync {
    /// The argument this mapper can produce.
    fn provides(&self) -> ArgRequest;

    /// Produce the value from the available args, or `None` when the inputs
    /// it needs are missing.
    fn map(&self, args: &CallArgs) -> Option<ArgValue>;
}

/// Closure-backed [`DynamicFunc`].
pub struct DynFn {
    inputs: Vec<ArgRequest>,
    body: Box<
        dyn Fn(ResolvedArgs) -> BoxFuture<'static, Result<DynamicValue, InvokeError>>
            + Send
            + Sync,
    >,
}

impl DynFn {
    pub fn new<F>(inputs: Vec<ArgRequest>, body: F) -> Self
    where
        F: Fn(ResolvedArgs) -> BoxFuture<'static, Result<DynamicValue, InvokeError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            inputs,
            body: Box::new(body),
        }
    }
}

#[async_trait]
impl DynamicFunc for DynFn {
    fn inputs(&self) -> Vec<ArgRequest> {
        self.inputs.clone()
    }

    async fn invoke(&self, args: ResolvedArgs) -> Result<DynamicValue, InvokeError> {
        (self.body)(args).await
    }
}

fn resolve_one(
    request: &ArgRequest,
    mappers: &[Arc<dyn ArgMapper>],
    args: &CallArgs,
) -> Option<ArgValue> {
    let direct = match request {
        ArgRequest::Typed { id, .. } => args
            .find_typed(*id)
            .or_else(|| args.find_named_of_type(*id)),
        ArgRequest::Named(name) => args.find_named(name),
    };
    if direct.is_some() {
        return direct;
    }

    mappers
        .iter()
        .filter(|m| m.provides().satisfies(request))
        .find_map(|m| m.map(args))
}

/// Invoke `func`, resolving each declared input from `args` and the mapper
/// chain. Every unsatisfied input is reported in one composite error.
pub async fn call_dynamic_raw(
    func: &dyn DynamicFunc,
    mappers: &[Arc<dyn ArgMapper>],
    args: &CallArgs,
) -> Result<DynamicValue, InvokeError> {
    let inputs = func.inputs();
    let mut resolved = Vec::with_capacity(inputs.len());
    let mut missing = ErrorList::new();

    for request in &inputs {
        match resolve_one(request, mappers, args) {
            Some(value) => resolved.push(value),
            None => missing.push(InvokeError::ArgumentUnsatisfied(request.to_string())),
        }
    }

    if !missing.is_empty() {
        return Err(InvokeError::Resolution(missing));
    }

    func.invoke(ResolvedArgs { values: resolved }).await
}

/// Invoke `func` and assert the returned value is a `T`.
pub async fn call_dynamic<T: Any + Send + Sync>(
    func: &dyn DynamicFunc,
    mappers: &[Arc<dyn ArgMapper>],
    args: &CallArgs,
) -> Result<T, InvokeError> {
    let raw = call_dynamic_raw(func, mappers, args).await?;
    raw.downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| InvokeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Endpoint(String);

    fn concat_func() -> DynFn {
        DynFn::new(
            vec![ArgRequest::typed::<Endpoint>(), ArgRequest::named("suffix")],
            |args| {
                Box::pin(async move {
                    let endpoint = args.get::<Endpoint>(0)?;
                    let suffix = args.get::<String>(1)?;
                    Ok(Box::new(format!("{}/{}", endpoint.0, suffix)) as DynamicValue)
                })
            },
        )
    }

    #[test]
    fn test_resolves_typed_and_named_inputs() {
        tokio_test::block_on(async {
            let func = concat_func();
            let args = CallArgs::new()
                .typed(Endpoint("http://localhost".to_string()))
                .named("suffix", "v1".to_string());

            let out = call_dynamic::<String>(&func, &[], &args).await.expect("call");
            assert_eq!(out, "http://localhost/v1");
        });
    }

    #[test]
    fn test_latest_typed_entry_wins() {
        tokio_test::block_on(async {
            let func = DynFn::new(vec![ArgRequest::typed::<Endpoint>()], |args| {
                Box::pin(async move {
                    let endpoint = args.get::<Endpoint>(0)?;
                    Ok(Box::new((*endpoint).clone()) as DynamicValue)
                })
            });
            let args = CallArgs::new()
                .typed(Endpoint("first".to_string()))
                .typed(Endpoint("second".to_string()));

            let out = call_dynamic::<Endpoint>(&func, &[], &args).await.expect("call");
            assert_eq!(out, Endpoint("second".to_string()));
        });
    }

    #[test]
    fn test_typed_request_falls_back_to_named_value_of_matching_type() {
        tokio_test::block_on(async {
            let func = DynFn::new(vec![ArgRequest::typed::<Endpoint>()], |args| {
                Box::pin(async move {
                    let endpoint = args.get::<Endpoint>(0)?;
                    Ok(Box::new((*endpoint).clone()) as DynamicValue)
                })
            });
            let args = CallArgs::new().named("server", Endpoint("by-name".to_string()));

            let out = call_dynamic::<Endpoint>(&func, &[], &args).await.expect("call");
            assert_eq!(out, Endpoint("by-name".to_string()));
        });
    }

    struct SuffixMapper;

    impl ArgMapper for SuffixMapper {
        fn provides(&self) -> ArgRequest {
            ArgRequest::named("suffix")
        }

        fn map(&self, args: &CallArgs) -> Option<ArgValue> {
            let endpoint = args.get_typed::<Endpoint>()?;
            Some(Arc::new(format!("mapped-{}", endpoint.0)))
        }
    }

    #[test]
    fn test_mapper_chain_fills_unresolved_inputs() {
        tokio_test::block_on(async {
            let func = concat_func();
            let mappers: Vec<Arc<dyn ArgMapper>> = vec![Arc::new(SuffixMapper)];
            let args = CallArgs::new().typed(Endpoint("base".to_string()));

            let out = call_dynamic::<String>(&func, &mappers, &args)
                .await
                .expect("call");
            assert_eq!(out, "base/mapped-base");
        });
    }

    #[test]
    fn test_every_unsatisfied_input_is_reported_once() {
        tokio_test::block_on(async {
            let func = concat_func();
            let err = call_dynamic::<String>(&func, &[], &CallArgs::new())
                .await
                .expect_err("must fail");

            match err {
                InvokeError::Resolution(list) => {
                    assert_eq!(list.len(), 2);
                    let rendered = list.to_string();
                    assert!(rendered.contains("Endpoint"));
                    assert!(rendered.contains("named(suffix)"));
                }
                other => panic!("expected resolution error, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_return_type_mismatch_is_detected() {
        tokio_test::block_on(async {
            let func = concat_func();
            let args = CallArgs::new()
                .typed(Endpoint("x".to_string()))
                .named("suffix", "y".to_string());

            let err = call_dynamic::<i64>(&func, &[], &args)
                .await
                .expect_err("must fail");
            assert!(matches!(err, InvokeError::TypeMismatch { .. }));
        });
    }

    #[test]
    fn test_raw_call_returns_the_boxed_value() {
        tokio_test::block_on(async {
            let func = concat_func();
            let args = CallArgs::new()
                .typed(Endpoint("x".to_string()))
                .named("suffix", "y".to_string());

            let raw = call_dynamic_raw(&func, &[], &args).await.expect("call");
            assert!(raw.downcast::<String>().is_ok());
        });
    }

    #[test]
    fn test_function_errors_bubble_verbatim() {
        tokio_test::block_on(async {
            let func = DynFn::new(Vec::new(), |_args| {
                Box::pin(async move { Err(InvokeError::message("plugin exploded")) })
            });

            let err = call_dynamic::<String>(&func, &[], &CallArgs::new())
                .await
                .expect_err("must fail");
            assert!(matches!(err, InvokeError::Call(_)));
            assert_eq!(err.to_string(), "plugin exploded");
        });
    }
}
