/*!
 * Command handlers and their composition.
 *
 * A [`Handler`] binds a compiled [`CommandPattern`] to an operation on a
 * device type. The operation is any function or closure taking `&D` followed
 * by up to five arguments implementing [`Arg`]; the argument value types are
 * read off its parameter types and every captured string is coerced before
 * the call.
 *
 * An operation whose result is itself a device is a [`Route`]. The
 * [`Combinator`] joins a route with each handler of the sub-device so that
 * `":INSTRument(.*)"` followed by `":CHANNEL(.*):VOLT (.*)"` dispatches as one
 * command without anyone writing the combined expression by hand.
 */
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result, SchemaError};
use crate::pattern::CommandPattern;
use crate::types::{Arg, Value, ValueType};

/// Argument and result types of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Declared value type of each captured argument, in order
    pub args: Vec<ValueType>,
    /// Declared result type
    pub returns: ValueType,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "({}) -> {}", args.join(", "), self.returns)
    }
}

/// Result of a leaf operation
pub trait Reply: 'static {
    /// Declared result type
    const TYPE: ValueType;

    /// Convert into the value handed back to the session
    fn into_value(self) -> Result<Value>;
}

impl Reply for () {
    const TYPE: ValueType = ValueType::Null;

    fn into_value(self) -> Result<Value> {
        Ok(Value::Null)
    }
}

macro_rules! reply_via_from {
    ($ty:ty, $value_type:expr) => {
        impl Reply for $ty {
            const TYPE: ValueType = $value_type;

            fn into_value(self) -> Result<Value> {
                Ok(Value::from(self))
            }
        }
    };
}

reply_via_from!(bool, ValueType::Bool);
reply_via_from!(i64, ValueType::Integer);
reply_via_from!(i32, ValueType::Integer);
reply_via_from!(f64, ValueType::Float);
reply_via_from!(f32, ValueType::Float);
reply_via_from!(String, ValueType::String);
reply_via_from!(&'static str, ValueType::String);
reply_via_from!(Vec<u8>, ValueType::Binary);
reply_via_from!(Bytes, ValueType::Binary);

impl Reply for u8 {
    const TYPE: ValueType = ValueType::Integer;

    fn into_value(self) -> Result<Value> {
        Ok(Value::Integer(self.into()))
    }
}

impl Reply for u32 {
    const TYPE: ValueType = ValueType::Integer;

    fn into_value(self) -> Result<Value> {
        Ok(Value::Integer(self.into()))
    }
}

impl Reply for usize {
    const TYPE: ValueType = ValueType::Integer;

    fn into_value(self) -> Result<Value> {
        i64::try_from(self)
            .map(Value::Integer)
            .map_err(|e| Error::runtime(e.to_string()))
    }
}

impl<T, E> Reply for std::result::Result<T, E>
where
    T: Reply,
    E: Into<Error> + 'static,
{
    const TYPE: ValueType = T::TYPE;

    fn into_value(self) -> Result<Value> {
        self.map_err(Into::into)?.into_value()
    }
}

/// Result of a route: the addressed sub-device
pub trait SubDevice<C>: 'static {
    /// The sub-device, `None` if nothing lives at the address
    fn into_device(self) -> Option<Arc<C>>;
}

impl<C: 'static> SubDevice<C> for Arc<C> {
    fn into_device(self) -> Option<Arc<C>> {
        Some(self)
    }
}

impl<C: 'static> SubDevice<C> for Option<Arc<C>> {
    fn into_device(self) -> Option<Arc<C>> {
        self
    }
}

/// A function bound to a command pattern.
///
/// `M` is a marker of the form `fn(A1, .., An) -> R` that lets one closure type
/// implement the trait for exactly one arity.
pub trait Operation<D, M>: Send + Sync + 'static {
    /// What the function returns
    type Output;

    /// Declared value types of the parameters after `&D`
    fn arg_types() -> Vec<ValueType>;

    /// Coerce the raw captures positionally and call the function
    fn invoke(&self, device: &D, raw: &[String]) -> Result<Self::Output>;
}

fn coerce_arg<A: Arg>(raw: &[String], position: usize) -> Result<A> {
    let text = raw
        .get(position)
        .ok_or_else(|| Error::argument(format!("missing argument {}", position + 1)))?;

    A::coerce(text).map_err(|reason| {
        Error::argument(format!(
            "argument {} ({}) from {:?}: {}",
            position + 1,
            A::TYPE,
            text,
            reason
        ))
    })
}

macro_rules! impl_operation {
    ($($arg:ident),*) => {
        impl<D, F, R, $($arg,)*> Operation<D, fn($($arg,)*) -> R> for F
        where
            F: Fn(&D, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: Arg,)*
        {
            type Output = R;

            fn arg_types() -> Vec<ValueType> {
                vec![$(<$arg as Arg>::TYPE),*]
            }

            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn invoke(&self, device: &D, raw: &[String]) -> Result<R> {
                let mut position = 0usize;
                $(
                    let $arg = coerce_arg::<$arg>(raw, position)?;
                    position += 1;
                )*
                Ok(self(device, $($arg),*))
            }
        }
    };
}

impl_operation!();
impl_operation!(A1);
impl_operation!(A1, A2);
impl_operation!(A1, A2, A3);
impl_operation!(A1, A2, A3, A4);
impl_operation!(A1, A2, A3, A4, A5);

fn check_arity(pattern: &CommandPattern, params: usize) -> std::result::Result<(), SchemaError> {
    let captures = pattern.capture_count();
    if captures != params {
        return Err(SchemaError::ArgumentCount {
            template: pattern.template().to_string(),
            captures,
            params,
        });
    }
    Ok(())
}

type Invoke<D> = Arc<dyn Fn(&D, &[String]) -> Result<Value> + Send + Sync>;
type Select<P, C> = Arc<dyn Fn(&P, &[String]) -> Result<Arc<C>> + Send + Sync>;

/// A compiled pattern bound to a leaf operation of device type `D`
pub struct Handler<D> {
    pattern: CommandPattern,
    signature: Signature,
    invoke: Invoke<D>,
}

impl<D: 'static> Handler<D> {
    /// Bind an operation to a pattern.
    ///
    /// Fails when the number of capture groups differs from the number of
    /// parameters the operation declares.
    pub fn from_operation<M, O>(
        pattern: CommandPattern,
        op: O,
    ) -> std::result::Result<Self, SchemaError>
    where
        O: Operation<D, M>,
        O::Output: Reply,
    {
        let args = O::arg_types();
        check_arity(&pattern, args.len())?;

        let invoke: Invoke<D> =
            Arc::new(move |device: &D, raw: &[String]| op.invoke(device, raw)?.into_value());

        Ok(Self {
            pattern,
            signature: Signature {
                args,
                returns: <O::Output as Reply>::TYPE,
            },
            invoke,
        })
    }

    /// Coerce the raw arguments and run the operation on `device`
    pub fn invoke(&self, device: &D, raw: &[String]) -> Result<Value> {
        (self.invoke)(device, raw)
    }

    /// The compiled pattern
    pub fn pattern(&self) -> &CommandPattern {
        &self.pattern
    }

    /// Argument and result types
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl<D> Clone for Handler<D> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            signature: self.signature.clone(),
            invoke: self.invoke.clone(),
        }
    }
}

impl<D> fmt::Debug for Handler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("pattern", &self.pattern.template())
            .field("signature", &self.signature)
            .finish()
    }
}

/// A handler of `P` whose result is the sub-device `C`
pub struct Route<P, C> {
    pattern: CommandPattern,
    args: Vec<ValueType>,
    select: Select<P, C>,
}

impl<P: 'static, C: 'static> Route<P, C> {
    /// Bind a sub-device lookup to a pattern.
    ///
    /// Raw patterns are refused: a route is always re-exposed under the
    /// abbreviation rules of its parent.
    pub fn from_operation<M, O>(
        pattern: CommandPattern,
        op: O,
    ) -> std::result::Result<Self, SchemaError>
    where
        O: Operation<P, M>,
        O::Output: SubDevice<C>,
    {
        if pattern.is_raw() {
            return Err(SchemaError::RawSubsystem(pattern.template().to_string()));
        }
        let args = O::arg_types();
        check_arity(&pattern, args.len())?;

        let template = pattern.template().to_string();
        let select: Select<P, C> = Arc::new(move |parent: &P, raw: &[String]| {
            op.invoke(parent, raw)?
                .into_device()
                .ok_or_else(|| Error::no_such_unit(format!("{} with {:?}", template, raw)))
        });

        Ok(Self {
            pattern,
            args,
            select,
        })
    }

    /// Resolve the sub-device addressed by `raw`
    pub fn select(&self, parent: &P, raw: &[String]) -> Result<Arc<C>> {
        (self.select)(parent, raw)
    }

    /// The compiled prefix pattern
    pub fn pattern(&self) -> &CommandPattern {
        &self.pattern
    }
}

/// Joins routes with sub-device handlers
pub struct Combinator;

impl Combinator {
    /// Build the handler for `route` followed by `child`.
    ///
    /// The route consumes the first captures to pick the sub-device; the
    /// remaining captures go to `child` executed on that sub-device.
    pub fn combine<P, C>(
        route: &Route<P, C>,
        child: &Handler<C>,
    ) -> std::result::Result<Handler<P>, SchemaError>
    where
        P: 'static,
        C: 'static,
    {
        let pattern = route.pattern.concat(&child.pattern)?;

        let split = route.args.len();
        let mut args = route.args.clone();
        args.extend(child.signature.args.iter().copied());

        let select = route.select.clone();
        let child_invoke = child.invoke.clone();
        let invoke: Invoke<P> = Arc::new(move |parent: &P, raw: &[String]| {
            let (head, tail) = raw.split_at(split.min(raw.len()));
            let unit = select(parent, head)?;
            child_invoke(&unit, tail)
        });

        Ok(Handler {
            pattern,
            signature: Signature {
                args,
                returns: child.signature.returns,
            },
            invoke,
        })
    }
}
