//! In-memory representation of a registered statement.

use crate::types::Value;
use std::fmt;
use std::fmt::Write as _;

/// Kind of a declared statement element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// INSERT statement
    Insert,
    /// UPDATE or DELETE statement
    Update,
    /// SELECT query
    Select,
    /// `<if>` fragment declared inside another statement
    ConditionalFragment,
    /// Unrecognized element
    Unknown,
}

impl StatementKind {
    /// Kind of a markup element name (`select`, `insert`, `update`, `delete`, `if`).
    pub fn from_element(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "select" => Self::Select,
            "insert" => Self::Insert,
            "update" | "delete" => Self::Update,
            "if" => Self::ConditionalFragment,
            _ => Self::Unknown,
        }
    }

    /// Kind of ad-hoc SQL text, detected from its leading keyword.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim_start();
        let prefix: String = trimmed.chars().take(10).collect::<String>().to_uppercase();

        if prefix.starts_with("SELECT") {
            Self::Select
        } else if prefix.starts_with("INSERT") {
            Self::Insert
        } else {
            Self::Update
        }
    }

    /// True for element kinds that carry executable SQL.
    pub fn is_sql(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Select)
    }

    /// True for kinds accepted by execution calls.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Select => "SELECT",
            Self::ConditionalFragment => "IF",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// When a conditional fragment is spliced into the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresencePolicy {
    /// Include the fragment when the tested key is present
    IncludeIfPresent,
    /// Include the fragment when the tested key is absent
    IncludeIfAbsent,
}

impl PresencePolicy {
    /// Policy from the markup `exist` attribute: empty or `true` means present.
    pub fn from_attribute(exist: &str) -> Self {
        if exist.is_empty() || exist.eq_ignore_ascii_case("true") {
            Self::IncludeIfPresent
        } else {
            Self::IncludeIfAbsent
        }
    }
}

/// A conditional fragment and the unique token marking its place in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalClause {
    token: String,
    key: String,
    fragment: String,
    policy: PresencePolicy,
}

impl ConditionalClause {
    pub(crate) fn new(token: String, key: &str, fragment: &str, policy: PresencePolicy) -> Self {
        Self {
            token,
            key: key.to_string(),
            fragment: fragment.to_string(),
            policy,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Parameter name tested for presence.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn policy(&self) -> PresencePolicy {
        self.policy
    }
}

/// Whether a placeholder takes one scalar or an expandable list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Normal,
    Array,
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindMode::Normal => f.write_str("NORMAL"),
            BindMode::Array => f.write_str("ARRAY"),
        }
    }
}

/// A declared placeholder slot.
///
/// `hold_pos` is the 1-based byte offset of the placeholder's hold marker
/// inside the statement's held text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    name: String,
    hold_pos: usize,
    mode: BindMode,
}

impl ColumnBinding {
    pub fn new(name: &str, hold_pos: usize) -> Self {
        Self {
            name: name.to_string(),
            hold_pos,
            mode: BindMode::Normal,
        }
    }

    pub fn array(name: &str, hold_pos: usize) -> Self {
        Self {
            name: name.to_string(),
            hold_pos,
            mode: BindMode::Array,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hold_pos(&self) -> usize {
        self.hold_pos
    }

    pub fn mode(&self) -> BindMode {
        self.mode
    }

    pub fn is_array(&self) -> bool {
        self.mode == BindMode::Array
    }
}

impl fmt::Display for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.hold_pos, self.mode)
    }
}

/// A named SQL template.
///
/// Once registered a statement is shared read-only. Refinement and array
/// expansion work on clones, so the registered value never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub(crate) id: String,
    pub(crate) kind: StatementKind,
    pub(crate) text: String,
    pub(crate) clauses: Vec<ConditionalClause>,
    pub(crate) columns: Vec<ColumnBinding>,
    pub(crate) held_text: String,
    pub(crate) resolved_text: String,
}

impl Statement {
    /// A statement with no conditional clauses; call a normalizer before use.
    pub fn new(id: &str, kind: StatementKind, text: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            text: text.to_string(),
            clauses: Vec::new(),
            columns: Vec::new(),
            held_text: String::new(),
            resolved_text: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Template text, possibly holding clause tokens and named placeholders.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clauses(&self) -> &[ConditionalClause] {
        &self.clauses
    }

    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    /// Text with every placeholder replaced by a hold marker.
    pub fn held_text(&self) -> &str {
        &self.held_text
    }

    /// Text in the driver's native placeholder syntax.
    pub fn resolved_text(&self) -> &str {
        &self.resolved_text
    }

    pub fn has_condition(&self) -> bool {
        !self.clauses.is_empty()
    }

    pub fn has_array_bind(&self) -> bool {
        self.columns.iter().any(ColumnBinding::is_array)
    }

    pub fn first_is_array_bind(&self) -> bool {
        self.columns.first().is_some_and(ColumnBinding::is_array)
    }

    /// Render `[id] text` followed by the bound parameter list.
    pub fn debug(&self, params: &[Value]) -> String {
        let mut out = format!("[{}] {}", self.id, self.resolved_text);
        out.push_str(&debug_params(&self.id, params));
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self.columns.iter().map(ToString::to_string).collect();
        write!(
            f,
            "kind=[{}], id=[{}], query=[{}], clauses=[{}], columns=[{}], hold=[{}]",
            self.kind,
            self.id,
            self.resolved_text,
            self.clauses.len(),
            columns.join(" "),
            self.held_text
        )
    }
}

/// Render `\n[id] params : [v1] [v2] ...`, or nothing for an empty list.
pub fn debug_params(id: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return String::new();
    }

    let mut out = format!("\n[{id}] params : ");
    for value in params {
        let _ = write!(out, "[{value}] ");
    }
    out
}
