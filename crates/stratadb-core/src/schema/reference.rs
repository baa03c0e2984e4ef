///
/// ReferenceKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReferenceKind {
    /// This entity carries the target's foreign key.
    BelongsTo,
    /// Exactly one target row carries this entity's foreign key.
    HasOne,
    /// Many target rows carry this entity's foreign key.
    HasMany,
    /// Many-to-many through a junction entity keyed by both foreign keys.
    HasManyThrough,
}

///
/// Reference
///
/// Declared association between two entities. A `HasManyThrough` reference
/// names the junction entity whose rows are created/removed only as a side
/// effect of relationship sync.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
    kind: ReferenceKind,
    target: String,
    sort_keys: Vec<String>,
    required: bool,
    remove_dependents: bool,
    junction: Option<String>,
}

impl Reference {
    #[must_use]
    pub fn new(kind: ReferenceKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            sort_keys: vec!["updatedAt".to_string()],
            required: true,
            remove_dependents: false,
            junction: None,
        }
    }

    #[must_use]
    pub fn sort_keys<S: Into<String>>(mut self, sort_keys: impl IntoIterator<Item = S>) -> Self {
        self.sort_keys = sort_keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Dependent rows on the far side are removed when this entity is
    /// removed (cascade).
    #[must_use]
    pub const fn remove_dependents(mut self) -> Self {
        self.remove_dependents = true;
        self
    }

    #[must_use]
    pub fn through(mut self, junction: impl Into<String>) -> Self {
        self.junction = Some(junction.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ReferenceKind {
        self.kind
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn reference_sort_keys(&self) -> &[String] {
        &self.sort_keys
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn removes_dependents(&self) -> bool {
        self.remove_dependents
    }

    #[must_use]
    pub fn junction(&self) -> Option<&str> {
        self.junction.as_deref()
    }
}
