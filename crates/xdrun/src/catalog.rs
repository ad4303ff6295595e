//! # Type Catalog
//!
//! Resolves constructors, methods and fields by class name, member name and
//! exact parameter signature, the way a reflective runtime would, but from a
//! table each exposed class registers up front.
//!
//! ## Philosophy
//!
//! - **Typed at the edges**: `ClassBuilder<T>` takes closures over the real
//!   type `T`. Type erasure happens once, inside the builder.
//! - **Exact signatures**: a member matches only if its parameter tags equal
//!   the requested tags, in order. No widening, no overload ranking.
//! - **User code may fail**: member bodies return `anyhow::Result`. A failing
//!   body becomes `Error::Invocation`, never a panic in the dispatcher.
//!
//! Static fields have no instance to live in, so the catalog stores them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use xdrpc::FailureReason;
use xdrpc::Scope;
use xdrpc::TypeTag;
use xdrpc::Value;
use xdrpc::value::check_args;

/// A live server-side object.
pub type Object = dyn Any + Send + Sync;
pub type Instance = Box<Object>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ClassNotFound(String),
    ConstructorNotFound { class_name: String, arg_types: Vec<TypeTag> },
    MethodNotFound { class_name: String, method_name: String },
    FieldNotFound { class_name: String, field_name: String },
    TypeMismatch(String),
    Invocation(String),
}

impl Error {
    /// The reason reported to the remote caller.
    pub fn reason(&self) -> FailureReason {
        match self {
            Error::ClassNotFound(_) => FailureReason::ClassNotFound,
            Error::ConstructorNotFound { .. } => FailureReason::MemberNotFound,
            Error::MethodNotFound { .. } => FailureReason::MemberNotFound,
            Error::FieldNotFound { .. } => FailureReason::MemberNotFound,
            Error::TypeMismatch(_) => FailureReason::TypeMismatch,
            Error::Invocation(msg) => FailureReason::InvocationFailed(msg.clone()),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassNotFound(name) => write!(f, "Class not found: {}", name),
            Self::ConstructorNotFound { class_name, arg_types } => {
                write!(f, "No constructor {}(", class_name)?;
                for (i, ty) in arg_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            Self::MethodNotFound { class_name, method_name } => {
                write!(f, "Method not found: {}.{}", class_name, method_name)
            }
            Self::FieldNotFound { class_name, field_name } => {
                write!(f, "Field not found: {}.{}", class_name, field_name)
            }
            Self::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            Self::Invocation(msg) => write!(f, "Invocation failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<xdrpc::Error> for Error {
    fn from(e: xdrpc::Error) -> Self {
        Error::TypeMismatch(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type ConstructFn = Arc<dyn Fn(&[Value]) -> Result<Instance> + Send + Sync>;
type InstanceMethodFn = Arc<dyn Fn(&mut Object, &[Value]) -> Result<Value> + Send + Sync>;
type StaticMethodFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
type GetFn = Arc<dyn Fn(&Object) -> Result<Value> + Send + Sync>;
type SetFn = Arc<dyn Fn(&mut Object, Value) -> Result<()> + Send + Sync>;

/// Dynamic member lookup by name and signature.
pub trait TypeCatalog: Send + Sync + 'static {
    fn resolve_constructor(&self, class_name: &str, arg_types: &[TypeTag]) -> Result<Constructor>;

    fn resolve_method(
        &self,
        class_name: &str,
        method_name: &str,
        arg_types: &[TypeTag],
        scope: Scope,
    ) -> Result<Method>;

    fn resolve_field(&self, class_name: &str, field_name: &str, scope: Scope) -> Result<Field>;
}

#[derive(Clone)]
pub struct Constructor {
    params: Vec<TypeTag>,
    body: ConstructFn,
}

impl Constructor {
    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    pub fn construct(&self, args: &[Value]) -> Result<Instance> {
        check_args(&self.params, args)?;
        (self.body)(args)
    }
}

#[derive(Clone)]
enum MethodBody {
    Instance(InstanceMethodFn),
    Static(StaticMethodFn),
}

#[derive(Clone)]
pub struct Method {
    class_name: String,
    name: String,
    params: Vec<TypeTag>,
    body: MethodBody,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        match self.body {
            MethodBody::Instance(_) => Scope::Instance,
            MethodBody::Static(_) => Scope::Static,
        }
    }

    /// Runs an instance method on `target`.
    pub fn invoke(&self, target: &mut Object, args: &[Value]) -> Result<Value> {
        check_args(&self.params, args)?;
        match &self.body {
            MethodBody::Instance(f) => f(target, args),
            MethodBody::Static(f) => f(args),
        }
    }

    /// Runs a static method.
    pub fn invoke_static(&self, args: &[Value]) -> Result<Value> {
        check_args(&self.params, args)?;
        match &self.body {
            MethodBody::Static(f) => f(args),
            MethodBody::Instance(_) => Err(Error::MethodNotFound {
                class_name: self.class_name.clone(),
                method_name: self.name.clone(),
            }),
        }
    }
}

#[derive(Clone)]
enum FieldSlot {
    Instance { get: GetFn, set: SetFn },
    Static { statics: Arc<DashMap<String, Value>> },
}

#[derive(Clone)]
pub struct Field {
    name: String,
    ty: TypeTag,
    slot: FieldSlot,
}

impl Field {
    pub fn ty(&self) -> TypeTag {
        self.ty
    }

    pub fn read(&self, target: Option<&Object>) -> Result<Value> {
        match (&self.slot, target) {
            (FieldSlot::Instance { get, .. }, Some(target)) => get(target),
            (FieldSlot::Static { statics }, _) => Ok(statics
                .get(&self.name)
                .map(|v| v.value().clone())
                .unwrap_or(Value::Null)),
            (FieldSlot::Instance { .. }, None) => {
                Err(Error::TypeMismatch(format!("{} is an instance field", self.name)))
            }
        }
    }

    pub fn write(&self, target: Option<&mut Object>, value: Value) -> Result<()> {
        if !self.ty.accepts(&value) {
            return Err(Error::TypeMismatch(format!(
                "field {} is {}, got {}",
                self.name,
                self.ty,
                value.type_name()
            )));
        }

        match (&self.slot, target) {
            (FieldSlot::Instance { set, .. }, Some(target)) => set(target, value),
            (FieldSlot::Static { statics }, _) => {
                statics.insert(self.name.clone(), value);
                Ok(())
            }
            (FieldSlot::Instance { .. }, None) => {
                Err(Error::TypeMismatch(format!("{} is an instance field", self.name)))
            }
        }
    }
}

/// Everything the catalog knows about one class.
pub struct ClassDef {
    name: String,
    constructors: Vec<Constructor>,
    methods: HashMap<String, Vec<Method>>,
    fields: HashMap<String, Field>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds a `ClassDef` for the concrete type `T`.
pub struct ClassBuilder<T> {
    def: ClassDef,
    statics: Arc<DashMap<String, Value>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

fn downcast_mut<'a, T: Any>(class_name: &str, target: &'a mut Object) -> Result<&'a mut T> {
    target
        .downcast_mut::<T>()
        .ok_or_else(|| Error::TypeMismatch(format!("instance is not a {}", class_name)))
}

fn downcast_ref<'a, T: Any>(class_name: &str, target: &'a Object) -> Result<&'a T> {
    target
        .downcast_ref::<T>()
        .ok_or_else(|| Error::TypeMismatch(format!("instance is not a {}", class_name)))
}

fn invocation(e: anyhow::Error) -> Error {
    Error::Invocation(format!("{:#}", e))
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            def: ClassDef {
                name: class_name.into(),
                constructors: Vec::new(),
                methods: HashMap::new(),
                fields: HashMap::new(),
            },
            statics: Arc::new(DashMap::new()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn constructor<F>(mut self, params: Vec<TypeTag>, f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let body: ConstructFn = Arc::new(move |args: &[Value]| {
            let object = f(args).map_err(invocation)?;
            Ok(Box::new(object) as Instance)
        });
        self.def.constructors.push(Constructor { params, body });
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, params: Vec<TypeTag>, f: F) -> Self
    where
        F: Fn(&mut T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let class_name = self.def.name.clone();
        let body: InstanceMethodFn = Arc::new(move |target: &mut Object, args: &[Value]| {
            let this = downcast_mut::<T>(&class_name, target)?;
            f(this, args).map_err(invocation)
        });
        self.push_method(name.into(), params, MethodBody::Instance(body))
    }

    pub fn static_method<F>(self, name: impl Into<String>, params: Vec<TypeTag>, f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let body: StaticMethodFn = Arc::new(move |args: &[Value]| f(args).map_err(invocation));
        self.push_method(name.into(), params, MethodBody::Static(body))
    }

    pub fn field<G, S>(mut self, name: impl Into<String>, ty: TypeTag, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let get_class = self.def.name.clone();
        let set_class = self.def.name.clone();

        let get: GetFn = Arc::new(move |target: &Object| Ok(get(downcast_ref::<T>(&get_class, target)?)));
        let set: SetFn = Arc::new(move |target: &mut Object, value: Value| {
            let this = downcast_mut::<T>(&set_class, target)?;
            set(this, value).map_err(invocation)
        });

        self.def.fields.insert(
            name.clone(),
            Field {
                name,
                ty,
                slot: FieldSlot::Instance { get, set },
            },
        );
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, ty: TypeTag, initial: Value) -> Self {
        let name = name.into();
        self.statics.insert(name.clone(), initial);
        self.def.fields.insert(
            name.clone(),
            Field {
                name,
                ty,
                slot: FieldSlot::Static {
                    statics: self.statics.clone(),
                },
            },
        );
        self
    }

    pub fn build(self) -> ClassDef {
        self.def
    }

    fn push_method(mut self, name: String, params: Vec<TypeTag>, body: MethodBody) -> Self {
        let method = Method {
            class_name: self.def.name.clone(),
            name: name.clone(),
            params,
            body,
        };
        self.def.methods.entry(name).or_default().push(method);
        self
    }
}

/// The registration-table catalog.
#[derive(Default)]
pub struct Catalog {
    classes: HashMap<String, ClassDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class`, replacing any earlier definition with the same name.
    pub fn register(mut self, class: ClassDef) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    fn class(&self, class_name: &str) -> Result<&ClassDef> {
        self.classes
            .get(class_name)
            .ok_or_else(|| Error::ClassNotFound(class_name.to_string()))
    }
}

impl TypeCatalog for Catalog {
    fn resolve_constructor(&self, class_name: &str, arg_types: &[TypeTag]) -> Result<Constructor> {
        let class = self.class(class_name)?;
        class
            .constructors
            .iter()
            .find(|c| c.params == arg_types)
            .cloned()
            .ok_or_else(|| Error::ConstructorNotFound {
                class_name: class_name.to_string(),
                arg_types: arg_types.to_vec(),
            })
    }

    fn resolve_method(
        &self,
        class_name: &str,
        method_name: &str,
        arg_types: &[TypeTag],
        scope: Scope,
    ) -> Result<Method> {
        let class = self.class(class_name)?;
        class
            .methods
            .get(method_name)
            .and_then(|overloads| {
                overloads
                    .iter()
                    .find(|m| m.params == arg_types && m.scope() == scope)
            })
            .cloned()
            .ok_or_else(|| Error::MethodNotFound {
                class_name: class_name.to_string(),
                method_name: method_name.to_string(),
            })
    }

    fn resolve_field(&self, class_name: &str, field_name: &str, scope: Scope) -> Result<Field> {
        let class = self.class(class_name)?;
        let field = class.fields.get(field_name).filter(|f| {
            let is_static = matches!(f.slot, FieldSlot::Static { .. });
            is_static == (scope == Scope::Static)
        });

        field.cloned().ok_or_else(|| Error::FieldNotFound {
            class_name: class_name.to_string(),
            field_name: field_name.to_string(),
        })
    }
}
