//! Error types for stmtmap.
//!
//! This module defines domain-specific error types organized by the stage that
//! raises them: parameter shape, binding, statement lookup, results, driver
//! and configuration.

use crate::query::results::ExecResult;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum MapperError {
    /// Unsupported parameter shapes
    #[error(transparent)]
    Param(#[from] ParamError),

    /// Column binding failures
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Statement lookup and kind errors
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Result materialization errors
    #[error(transparent)]
    Result(#[from] ResultError),

    /// Errors reported by the backing driver
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Value conversion errors
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Preference parsing and validation errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error raised while running the statement `id`
    #[error("[{id}] {source}")]
    Annotated {
        id: String,
        source: Box<MapperError>,
    },

    /// A batch stopped at `row`, counted from the first row of the batch.
    ///
    /// `partial` holds what the first pass applied. When the failure came
    /// from the pass restarted after a lost connection, rows that pass
    /// applied before `row` are not in `partial`.
    #[error("[{id}] batch stopped at row {row}: {source}")]
    Batch {
        id: String,
        row: usize,
        partial: ExecResult,
        source: Box<MapperError>,
    },
}

/// Parameter values whose shape cannot be bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    /// Type-erased values carry no bindable shape
    #[error("not supported type : interface")]
    InterfaceNotSupported,

    /// More than one level of optional indirection
    #[error("not supported type : ptr")]
    PtrNotSupported,

    /// Mapping keys must be strings
    #[error("map key should be string")]
    InvalidMapKeyType,

    /// A required optional parameter was `None`
    #[error("destination pointer is nil")]
    NilPtr,

    /// A list parameter holds elements that cannot be bound in this context
    #[error("unacceptable parameter type in list. kind={kind}")]
    UnacceptableListElement { kind: &'static str },

    /// Batch elements must all share the shape of the first one
    #[error("batch element {index} should be {expected}, found {found}")]
    BatchShapeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failures while matching parameter values to column bindings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A declared column has no value in the named parameters
    #[error("not found {name} from parameter values")]
    MissingKey { name: String },

    /// Fewer positional values than declared columns
    #[error("binding parameter count mismatch. defined={defined}, args={args}")]
    CountMismatch { defined: usize, args: usize },

    /// More than one IN array expanded in a single call
    #[error("this version only support 1 IN array binding")]
    MultipleArrayBinding,

    /// A normal column received a list, mapping or record
    #[error("column {name} needs a scalar value")]
    NotScalar { name: String },
}

/// Statement lookup, registration and kind errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// No statement registered for the id
    #[error("not found query statement for id : {id}")]
    NotFound { id: String },

    /// Two statements share one (case-insensitive) id
    #[error("duplicated user statement id : {id}")]
    Duplicate { id: String },

    /// Execution requested for a read statement
    #[error("invalid execution for sql. only insert or update permitted")]
    InvalidExecutionKind,

    /// Query requested for a write statement
    #[error("invalid query for sql. only select permitted")]
    InvalidQueryKind,

    /// The driver name has no placeholder normalizer
    #[error("not found normalizer for {driver}")]
    NormalizerNotFound { driver: String },

    /// Statement text could not be normalized
    #[error("malformed statement {id}: {message}")]
    Malformed { id: String, message: String },
}

/// Errors produced while materializing results.
#[derive(Error, Debug)]
pub enum ResultError {
    /// Single-row fetch found nothing
    #[error("sql: no rows in result set")]
    NoRows,

    /// The result carries no generated identifier
    #[error("sql: no insert id")]
    NoInsertId,

    /// An insert inside a batch reported no generated identifier
    #[error("fail to get last inserted id : {message}")]
    MissingInsertId { message: String },

    /// Scalar destinations do not match the row width
    #[error("expected {expected} destination arguments in scan, not {got}")]
    ColumnCountMismatch { expected: usize, got: usize },

    /// A column value could not be assigned to its destination
    #[error("fail to scan column {column}: {source}")]
    Scan {
        column: String,
        source: ConversionError,
    },

    /// The cursor has been released
    #[error("result cursor is closed")]
    CursorClosed,

    /// Scan called before a row was fetched
    #[error("scan called without a current row")]
    NoCurrentRow,
}

/// Errors reported by the backing driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The connection was lost; the only transient condition the mapper retries
    #[error("driver: bad connection")]
    BadConnection,

    /// Any other driver failure
    #[error("driver: {0}")]
    Failed(String),
}

/// Errors related to value conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The value has a different type than the destination
    #[error("cannot convert {found} into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Numeric value out of range for the destination
    #[error("value {value} overflows {target}")]
    Overflow { value: String, target: &'static str },

    /// NULL scanned into a non-nullable destination
    #[error("unexpected NULL for {expected}")]
    UnexpectedNull { expected: &'static str },
}

/// Errors related to preference parsing and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// DSN could not be parsed
    #[error("Failed to parse data source name: {0}")]
    ParseError(String),

    /// A preference value is out of range
    #[error("Invalid preference '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },
}

impl MapperError {
    /// Attach the statement id, unless the error already carries one.
    pub fn in_statement(self, id: &str) -> Self {
        match self {
            err @ (MapperError::Annotated { .. } | MapperError::Batch { .. }) => err,
            other => MapperError::Annotated {
                id: id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with statement annotations removed.
    pub fn root(&self) -> &MapperError {
        match self {
            MapperError::Annotated { source, .. } | MapperError::Batch { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// True when the root cause is a lost connection.
    pub fn is_bad_connection(&self) -> bool {
        matches!(self.root(), MapperError::Driver(DriverError::BadConnection))
    }

    /// Rows applied before a batch stopped.
    pub fn partial_result(&self) -> Option<&ExecResult> {
        match self {
            MapperError::Batch { partial, .. } => Some(partial),
            MapperError::Annotated { source, .. } => source.partial_result(),
            _ => None,
        }
    }

    /// Index of the batch row that failed.
    pub fn failed_row(&self) -> Option<usize> {
        match self {
            MapperError::Batch { row, .. } => Some(*row),
            MapperError::Annotated { source, .. } => source.failed_row(),
            _ => None,
        }
    }
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(err: std::num::ParseIntError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_error_messages() {
        assert_eq!(
            ParamError::InterfaceNotSupported.to_string(),
            "not supported type : interface"
        );
        assert_eq!(ParamError::PtrNotSupported.to_string(), "not supported type : ptr");
        assert_eq!(ParamError::InvalidMapKeyType.to_string(), "map key should be string");
        assert_eq!(ParamError::NilPtr.to_string(), "destination pointer is nil");
    }

    #[test]
    fn test_bind_error_display() {
        let err = BindError::MissingKey {
            name: "age".to_string(),
        };
        assert_eq!(err.to_string(), "not found age from parameter values");

        let err = BindError::CountMismatch {
            defined: 3,
            args: 1,
        };
        assert!(err.to_string().starts_with("binding parameter count mismatch"));
        assert!(err.to_string().contains("defined=3"));

        assert_eq!(
            BindError::MultipleArrayBinding.to_string(),
            "this version only support 1 IN array binding"
        );
    }

    #[test]
    fn test_annotation_keeps_root() {
        let err = MapperError::from(BindError::MultipleArrayBinding).in_statement("findUsers");
        assert!(err.to_string().starts_with("[findUsers]"));
        assert!(matches!(
            err.root(),
            MapperError::Bind(BindError::MultipleArrayBinding)
        ));

        // annotating twice keeps the first id
        let again = err.in_statement("other");
        assert!(again.to_string().starts_with("[findUsers]"));
    }

    #[test]
    fn test_bad_connection_detection() {
        let err = MapperError::from(DriverError::BadConnection).in_statement("insertUser");
        assert!(err.is_bad_connection());

        let err = MapperError::from(DriverError::Failed("duplicate key".to_string()));
        assert!(!err.is_bad_connection());
    }

    #[test]
    fn test_batch_error_carries_partial() {
        let partial = ExecResult::new(vec![1, 2], 2);
        let err = MapperError::Batch {
            id: "insertUser".to_string(),
            row: 2,
            partial,
            source: Box::new(DriverError::Failed("constraint".to_string()).into()),
        };
        assert_eq!(err.failed_row(), Some(2));
        assert_eq!(err.partial_result().map(ExecResult::rows_affected), Some(2));
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_result_error_display() {
        assert_eq!(ResultError::NoRows.to_string(), "sql: no rows in result set");
        assert_eq!(ResultError::NoInsertId.to_string(), "sql: no insert id");
        let err = ResultError::Scan {
            column: "age".to_string(),
            source: ConversionError::UnexpectedNull { expected: "i64" },
        };
        assert!(err.to_string().contains("age"));
    }
}
