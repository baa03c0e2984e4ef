use crate::record::Record;
use serde_json::Value;
use std::{fmt, sync::Arc};

/// Literal default or a zero-arg generator evaluated per record.
#[derive(Clone)]
pub enum AttributeDefault {
    Literal(Value),
    Generated(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl AttributeDefault {
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Generated(generate) => generate(),
        }
    }
}

impl fmt::Debug for AttributeDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

///
/// AttributeType
/// Structural type of one attribute value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    List,
    Map,
    Enum(Vec<String>),
}

impl AttributeType {
    /// Noun used in validation messages (`"<name> must be a string"`).
    #[must_use]
    pub const fn noun(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::List => "a list",
            Self::Map => "a map",
            Self::Enum(_) => "an enum value",
        }
    }

    /// Structural check against a concrete value. Enum membership is checked
    /// separately so the message can say `is invalid` rather than name a
    /// shape.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
            Self::Enum(allowed) => value
                .as_str()
                .is_some_and(|text| allowed.iter().any(|v| v == text)),
        }
    }
}

///
/// Watch
///
/// Recompute trigger for an attribute's `set` transform on save: never, on
/// any change, or when one of the named sibling attributes changes.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Watch {
    #[default]
    None,
    All,
    Fields(Vec<String>),
}

impl Watch {
    /// Whether a save that changed `changed` attribute names triggers this
    /// watcher.
    #[must_use]
    pub fn triggers_on(&self, changed: &[&str]) -> bool {
        match self {
            Self::None => false,
            Self::All => !changed.is_empty(),
            Self::Fields(fields) => fields.iter().any(|f| changed.contains(&f.as_str())),
        }
    }
}

/// Custom validation hook: `Ok(false)` and `Err(reason)` both count as a
/// single failed-validation signal for the attribute.
pub type ValidateFn = Arc<dyn Fn(&Value) -> Result<bool, String> + Send + Sync>;

/// Read-side transform applied when hydrating rows into models. Failures
/// are logged and the raw value kept; they never fail the read.
pub type GetFn = Arc<dyn Fn(&Value, &Record) -> Result<Value, String> + Send + Sync>;

/// Write-side transform applied before validation and on watcher triggers.
/// Returning `None` leaves the stored value untouched.
pub type SetFn = Arc<dyn Fn(Option<&Value>, &Record) -> Option<Value> + Send + Sync>;

///
/// Attribute
///
/// Declarative description of one entity attribute: type, presence rules,
/// default, transforms, and translator hints.
///

#[derive(Clone)]
pub struct Attribute {
    name: String,
    attribute_type: AttributeType,
    required: bool,
    read_only: bool,
    case_insensitive: bool,
    default: Option<AttributeDefault>,
    validate: Option<ValidateFn>,
    get: Option<GetFn>,
    set: Option<SetFn>,
    watch: Watch,
    db_column: Option<String>,
    db_skip: bool,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            required: false,
            read_only: false,
            case_insensitive: false,
            default: None,
            validate: None,
            get: None,
            set: None,
            watch: Watch::None,
            db_column: None,
            db_skip: false,
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }

    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Number)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Boolean)
    }

    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::List)
    }

    #[must_use]
    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Map)
    }

    #[must_use]
    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            AttributeType::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Key facet comparisons against this attribute use case-insensitive
    /// matching on the relational backend.
    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(AttributeDefault::Literal(value.into()));
        self
    }

    #[must_use]
    pub fn default_fn(mut self, generate: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(AttributeDefault::Generated(Arc::new(generate)));
        self
    }

    #[must_use]
    pub fn validate(
        mut self,
        validate: impl Fn(&Value) -> Result<bool, String> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    #[must_use]
    pub fn get(
        mut self,
        get: impl Fn(&Value, &Record) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.get = Some(Arc::new(get));
        self
    }

    #[must_use]
    pub fn set(
        mut self,
        set: impl Fn(Option<&Value>, &Record) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Arc::new(set));
        self
    }

    #[must_use]
    pub fn watch_all(mut self) -> Self {
        self.watch = Watch::All;
        self
    }

    #[must_use]
    pub fn watch<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.watch = Watch::Fields(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Override the relational column name (default: snake_case of the
    /// attribute name; the id attribute always maps to `id`).
    #[must_use]
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// This attribute has no relational column; it is dropped on writes and
    /// re-hydrated from its default on reads.
    #[must_use]
    pub const fn db_skip(mut self) -> Self {
        self.db_skip = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn attribute_type(&self) -> &AttributeType {
        &self.attribute_type
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub const fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    #[must_use]
    pub const fn default(&self) -> Option<&AttributeDefault> {
        self.default.as_ref()
    }

    #[must_use]
    pub const fn validator(&self) -> Option<&ValidateFn> {
        self.validate.as_ref()
    }

    #[must_use]
    pub const fn getter(&self) -> Option<&GetFn> {
        self.get.as_ref()
    }

    #[must_use]
    pub const fn setter(&self) -> Option<&SetFn> {
        self.set.as_ref()
    }

    #[must_use]
    pub const fn watch_spec(&self) -> &Watch {
        &self.watch
    }

    #[must_use]
    pub fn db_column_override(&self) -> Option<&str> {
        self.db_column.as_deref()
    }

    #[must_use]
    pub const fn is_db_skipped(&self) -> bool {
        self.db_skip
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.attribute_type)
            .field("required", &self.required)
            .field("read_only", &self.read_only)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}
