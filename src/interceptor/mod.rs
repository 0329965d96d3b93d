//! Call interception.
//!
//! An [`Interceptor`] sits between a caller and a function. [`wrap`] binds a
//! function to an interceptor and returns a [`Wrapped`] callable with the same
//! argument and return types. While the interceptor is active every call goes
//! through [`Interceptor::intercept`]; once deactivated, calls go straight to
//! the function.
//!
//! ```
//! use std::rc::Rc;
//! use callprobe::descriptor;
//! use callprobe::interceptor::{Interceptor, InterceptorSettings, Target, wrap};
//!
//! #[derive(Default)]
//! struct Announce {
//!     settings: InterceptorSettings,
//! }
//!
//! impl Interceptor for Announce {
//!     fn settings(&self) -> &InterceptorSettings {
//!         &self.settings
//!     }
//!
//!     fn intercept<R>(&self, target: &Rc<Target>, call: impl FnOnce() -> R) -> R {
//!         println!("calling {}", self.signature_name(target));
//!         call()
//!     }
//! }
//!
//! fn double(x: u32) -> u32 {
//!     x * 2
//! }
//!
//! let announce = Rc::new(Announce::default());
//! let double = wrap(&announce, descriptor!(double), double);
//! assert_eq!(double.call(21), 42);
//! ```

pub mod propagate;
pub mod template;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use template::{DEFAULT_TEMPLATE, NameTemplate};

/// Descriptive attributes of an intercepted function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    name: String,
    module: String,
    qualname: String,
}

impl FunctionDescriptor {
    /// Creates a descriptor from its three parts.
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        qualname: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            qualname: qualname.into(),
        }
    }

    /// Builds a descriptor from a written path such as `Parser::parse`.
    ///
    /// The path becomes the qualified name and its last segment the simple
    /// name. Whitespace is ignored, so `stringify!` output can be passed as is.
    pub fn from_path(module: &str, path: &str) -> Self {
        let qualname: String = path.chars().filter(|c| !c.is_whitespace()).collect();
        let name = qualname
            .rsplit("::")
            .next()
            .unwrap_or(qualname.as_str())
            .to_string();
        Self {
            name,
            module: module.to_string(),
            qualname,
        }
    }

    /// Simple name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defining module path.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Qualified name.
    pub fn qualname(&self) -> &str {
        &self.qualname
    }
}

impl fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.qualname)
    }
}

/// Builds a [`FunctionDescriptor`] for a function path at the call site.
///
/// The module is the `module_path!()` of the invocation.
///
/// ```
/// use callprobe::descriptor;
///
/// let d = descriptor!(Vec::push);
/// assert_eq!(d.name(), "push");
/// assert_eq!(d.qualname(), "Vec::push");
/// ```
#[macro_export]
macro_rules! descriptor {
    ($($segment:ident)::+) => {
        $crate::interceptor::FunctionDescriptor::from_path(
            module_path!(),
            stringify!($($segment)::+),
        )
    };
}

/// Handle identifying one wrapped function.
///
/// Identity is the allocation, not the descriptor: two functions wrapped
/// under the same name are still two targets. Compare with [`Target::same`].
#[derive(Debug)]
pub struct Target {
    descriptor: FunctionDescriptor,
}

impl Target {
    /// Allocates a new target.
    pub fn new(descriptor: FunctionDescriptor) -> Rc<Self> {
        Rc::new(Self { descriptor })
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    /// Reference equality of two target handles.
    pub fn same(a: &Rc<Target>, b: &Rc<Target>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

/// Serializable interceptor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Whether calls are intercepted right after construction.
    pub activated: bool,
    /// Signature-name template, see [`template`].
    pub name_template: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            activated: true,
            name_template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Activation flag and name template shared by every interceptor.
///
/// Both values live behind shared references so that an interceptor can be
/// reconfigured while wrapped functions hold on to it.
#[derive(Debug)]
pub struct InterceptorSettings {
    activated: Cell<bool>,
    name_template: RefCell<NameTemplate>,
}

impl InterceptorSettings {
    /// Validates `config` and builds the settings.
    pub fn new(config: &InterceptorConfig) -> Result<Self> {
        let name_template = NameTemplate::parse(&config.name_template)?;
        Ok(Self {
            activated: Cell::new(config.activated),
            name_template: RefCell::new(name_template),
        })
    }

    pub fn is_activated(&self) -> bool {
        self.activated.get()
    }

    pub fn set_activated(&self, activated: bool) {
        self.activated.set(activated);
    }

    pub fn name_template(&self) -> NameTemplate {
        self.name_template.borrow().clone()
    }

    /// Replaces the template. An invalid template leaves the old one in place.
    pub fn set_name_template(&self, template: &str) -> Result<()> {
        let parsed = NameTemplate::parse(template)?;
        *self.name_template.borrow_mut() = parsed;
        Ok(())
    }

    pub fn signature_name(&self, descriptor: &FunctionDescriptor) -> String {
        self.name_template.borrow().resolve(descriptor)
    }
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            activated: Cell::new(true),
            name_template: RefCell::new(NameTemplate::default()),
        }
    }
}

/// Behavior injected around calls of wrapped functions.
///
/// Implementors provide the settings and the hook; everything else has a
/// default. The interceptor is shared between all the functions it wraps and
/// is not meant to cross threads.
pub trait Interceptor {
    /// Activation flag and name template of this interceptor.
    fn settings(&self) -> &InterceptorSettings;

    /// Runs one call of `target` while active.
    ///
    /// `call` invokes the real function. The hook must call it exactly once
    /// and return its result unchanged.
    fn intercept<R>(&self, target: &Rc<Target>, call: impl FnOnce() -> R) -> R;

    fn is_activated(&self) -> bool {
        self.settings().is_activated()
    }

    fn is_deactivated(&self) -> bool {
        !self.is_activated()
    }

    /// Takes effect on the next call.
    fn set_activated(&self, activated: bool) {
        self.settings().set_activated(activated);
    }

    fn set_deactivated(&self, deactivated: bool) {
        self.set_activated(!deactivated);
    }

    fn name_template(&self) -> NameTemplate {
        self.settings().name_template()
    }

    /// Validates and installs a new name template.
    fn set_name_template(&self, template: &str) -> Result<()> {
        self.settings().set_name_template(template)
    }

    /// Human-readable identity of `target` under the current template.
    fn signature_name(&self, target: &Target) -> String {
        self.settings().signature_name(target.descriptor())
    }
}

/// A function bound to an interceptor.
///
/// Arguments are passed as a single value; use a tuple for several.
/// Clones share the same [`Target`].
pub struct Wrapped<I, F> {
    interceptor: Rc<I>,
    target: Rc<Target>,
    function: F,
}

impl<I: Interceptor, F> Wrapped<I, F> {
    pub fn target(&self) -> &Rc<Target> {
        &self.target
    }

    pub fn interceptor(&self) -> &Rc<I> {
        &self.interceptor
    }

    /// Calls the function, through the interceptor when it is active.
    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        if self.interceptor.is_deactivated() {
            return (self.function)(args);
        }
        self.interceptor
            .intercept(&self.target, || (self.function)(args))
    }

    /// Turns the wrapper into a plain closure.
    pub fn into_fn<A, R>(self) -> impl Fn(A) -> R
    where
        F: Fn(A) -> R,
    {
        move |args| self.call(args)
    }
}

impl<I, F: Clone> Clone for Wrapped<I, F> {
    fn clone(&self) -> Self {
        Self {
            interceptor: Rc::clone(&self.interceptor),
            target: Rc::clone(&self.target),
            function: self.function.clone(),
        }
    }
}

impl<I, F> fmt::Debug for Wrapped<I, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapped")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Binds `function` to `interceptor` under a fresh [`Target`].
pub fn wrap<I: Interceptor, F>(
    interceptor: &Rc<I>,
    descriptor: FunctionDescriptor,
    function: F,
) -> Wrapped<I, F> {
    Wrapped {
        interceptor: Rc::clone(interceptor),
        target: Target::new(descriptor),
        function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the signature name of every intercepted call.
    #[derive(Default)]
    struct Tracer {
        settings: InterceptorSettings,
        seen: RefCell<Vec<String>>,
    }

    impl Interceptor for Tracer {
        fn settings(&self) -> &InterceptorSettings {
            &self.settings
        }

        fn intercept<R>(&self, target: &Rc<Target>, call: impl FnOnce() -> R) -> R {
            self.seen.borrow_mut().push(self.signature_name(target));
            call()
        }
    }

    fn add((a, b): (i32, i32)) -> i32 {
        a + b
    }

    #[test]
    fn test_descriptor_macro() {
        let d = descriptor!(add);
        assert_eq!(d.name(), "add");
        assert_eq!(d.qualname(), "add");
        assert_eq!(d.module(), module_path!());

        let d = descriptor!(Tracer::intercept);
        assert_eq!(d.name(), "intercept");
        assert_eq!(d.qualname(), "Tracer::intercept");
    }

    #[test]
    fn test_from_path_strips_whitespace() {
        let d = FunctionDescriptor::from_path("m", "Outer :: inner");
        assert_eq!(d.qualname(), "Outer::inner");
        assert_eq!(d.name(), "inner");
        assert_eq!(d.to_string(), "m::Outer::inner");
    }

    #[test]
    fn test_wrapped_call_goes_through_hook() {
        let tracer = Rc::new(Tracer::default());
        let add = wrap(&tracer, descriptor!(add), add);

        assert_eq!(add.call((2, 3)), 5);
        assert_eq!(*tracer.seen.borrow(), vec!["add".to_string()]);
    }

    #[test]
    fn test_deactivated_calls_function_directly() {
        let tracer = Rc::new(Tracer::default());
        let add = wrap(&tracer, descriptor!(add), add);

        tracer.set_activated(false);
        assert!(tracer.is_deactivated());
        assert_eq!(add.call((1, 1)), 2);
        assert_eq!(add.call((4, 5)), 9);
        assert!(tracer.seen.borrow().is_empty());

        tracer.set_deactivated(false);
        assert!(tracer.is_activated());
        assert_eq!(add.call((1, 1)), 2);
        assert_eq!(tracer.seen.borrow().len(), 1);
    }

    #[test]
    fn test_config_controls_initial_activation() {
        let config = InterceptorConfig {
            activated: false,
            ..InterceptorConfig::default()
        };
        let settings = InterceptorSettings::new(&config).unwrap();
        assert!(!settings.is_activated());
    }

    #[test]
    fn test_invalid_config_template_rejected() {
        let config = InterceptorConfig {
            name_template: "{bogus}".to_string(),
            ..InterceptorConfig::default()
        };
        assert!(InterceptorSettings::new(&config).is_err());
    }

    #[test]
    fn test_set_name_template_applies_to_next_call() {
        let tracer = Rc::new(Tracer::default());
        let add = wrap(&tracer, FunctionDescriptor::new("add", "calc", "Calc::add"), add);

        add.call((0, 0));
        tracer.set_name_template("{module}.{qualname}").unwrap();
        add.call((0, 0));

        assert_eq!(
            *tracer.seen.borrow(),
            vec!["add".to_string(), "calc.Calc::add".to_string()]
        );
    }

    #[test]
    fn test_invalid_template_is_not_committed() {
        let tracer = Tracer::default();
        tracer.set_name_template("[{qualname}]").unwrap();

        assert!(tracer.set_name_template("{qualname").is_err());
        assert!(tracer.set_name_template("{file}").is_err());
        assert_eq!(tracer.name_template().as_str(), "[{qualname}]");
    }

    #[test]
    fn test_clones_share_target() {
        let tracer = Rc::new(Tracer::default());
        let first = wrap(&tracer, descriptor!(add), add);
        let second = first.clone();
        let other = wrap(&tracer, descriptor!(add), add);

        assert!(Target::same(first.target(), second.target()));
        assert!(!Target::same(first.target(), other.target()));
    }

    #[test]
    fn test_into_fn() {
        let tracer = Rc::new(Tracer::default());
        let square = wrap(&tracer, FunctionDescriptor::new("square", "m", "square"), |x: u64| x * x)
            .into_fn();

        assert_eq!(square(12), 144);
        assert_eq!(tracer.seen.borrow().len(), 1);
    }
}
