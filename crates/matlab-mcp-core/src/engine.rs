//! Engine collaborator contract and engine-native values.

use std::path::Path;

use thiserror::Error;

/// Engine call error.
///
/// The split between the two variants drives the whole fallback policy:
/// only `Execution` is allowed to move a request on to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine ran the code and the code itself raised an error.
    #[error("{0}")]
    Execution(String),
    /// The engine could not be reached or its reply was unusable.
    #[error("engine communication failed: {0}")]
    Communication(String),
}

/// A blocking connection to a running engine.
///
/// Every method blocks until the engine finishes the call. Implementations
/// serialize calls themselves; callers never hold a lock around them.
pub trait Engine: Send + Sync {
    /// Run a script file with value echo suppressed.
    ///
    /// # Errors
    /// Returns `Execution` if the script raises, `Communication` otherwise.
    fn run_script(&self, script: &Path) -> Result<(), EngineError>;

    /// Evaluate code and return the console text it produced.
    ///
    /// # Errors
    /// Returns `Execution` if the code raises, `Communication` otherwise.
    fn eval_capture(&self, code: &str) -> Result<String, EngineError>;

    /// Evaluate a single statement with output suppressed.
    ///
    /// # Errors
    /// Returns `Execution` if the statement raises, `Communication` otherwise.
    fn eval(&self, statement: &str) -> Result<(), EngineError>;

    /// Read a variable from the live workspace.
    ///
    /// Presence check and read happen in one call; `Ok(None)` means absent.
    ///
    /// # Errors
    /// Returns an error if the engine cannot answer.
    fn read_variable(&self, name: &str) -> Result<Option<EngineValue>, EngineError>;
}

/// Shape mismatch between dimensions and element count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dimensions {dims:?} describe {expected} elements but {actual} were supplied")]
pub struct ShapeError {
    pub dims: Vec<usize>,
    pub expected: usize,
    pub actual: usize,
}

/// N-dimensional array stored in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

impl<T> NdArray<T> {
    /// Create an array from dimensions and column-major data.
    ///
    /// # Errors
    /// Returns error if the element count does not match the dimensions.
    pub fn new(dims: Vec<usize>, data: Vec<T>) -> Result<Self, ShapeError> {
        let expected = dims.iter().product::<usize>();
        if expected != data.len() {
            return Err(ShapeError {
                dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// A 1x1 array.
    #[must_use]
    pub fn scalar(value: T) -> Self {
        Self {
            dims: vec![1, 1],
            data: vec![value],
        }
    }

    /// An Nx1 column.
    #[must_use]
    pub fn column(values: Vec<T>) -> Self {
        Self {
            dims: vec![values.len(), 1],
            data: values,
        }
    }

    /// A 1xN row.
    #[must_use]
    pub fn row(values: Vec<T>) -> Self {
        Self {
            dims: vec![1, values.len()],
            data: values,
        }
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Elements in column-major order.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }
}

impl<T: Clone> NdArray<T> {
    /// Build a 2-D array from row-major rows.
    ///
    /// # Errors
    /// Returns error if the rows are ragged.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, ShapeError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(ShapeError {
                dims: vec![rows.len(), cols],
                expected: rows.len() * cols,
                actual: rows.iter().map(Vec::len).sum(),
            });
        }
        let data = (0..cols)
            .flat_map(|col| rows.iter().map(move |row| row[col].clone()))
            .collect();
        Self::new(vec![rows.len(), cols], data)
    }
}

/// A value read from the engine workspace.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    /// Absence of a value.
    Empty,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    /// Real numeric array of any numeric class.
    Numeric { class: String, array: NdArray<f64> },
    /// Integer-class array (`int8` through `uint64`), held exactly.
    Integer { class: String, array: NdArray<i128> },
    Logical(NdArray<bool>),
    /// Character array, rows joined by newlines.
    Char(String),
    /// Anything else, kept as the engine's own textual display.
    Other { class: String, description: String },
}

impl EngineValue {
    /// Native type name as the engine reports it.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) | Self::Logical(_) => "logical",
            Self::Int(_) => "int64",
            Self::Real(_) => "double",
            Self::Text(_) | Self::Char(_) => "char",
            Self::Numeric { class, .. }
            | Self::Integer { class, .. }
            | Self::Other { class, .. } => class,
        }
    }

    /// A `double` array value.
    #[must_use]
    pub fn double(array: NdArray<f64>) -> Self {
        Self::Numeric {
            class: "double".to_string(),
            array,
        }
    }
}
