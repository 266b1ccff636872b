use serde::{Deserialize, Serialize};

/// What a cell holds: a literal number, a formula, or free text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    #[default]
    Number,
    Formula,
    Text,
}

/// Raw stored value of a cell. Numbers and text serialize as plain JSON
/// scalars (`42.0` / `"note"`), matching the snapshot cell `value` member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue::Number(0.0)
    }
}

impl RawValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Number(_) => None,
        }
    }
}

/// Outcome of evaluating one cell (or one row formula).
///
/// Errors are values, not exceptions: they attach to the offending cell and
/// propagate to dependents through reference reads, while unaffected cells
/// keep computing. Nothing is ever coerced to `0.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellStatus {
    Ok(f64),
    DivisionByZero,
    CircularReference,
    UnresolvedReference,
    ParseFailure,
    TypeMismatch,
}

impl CellStatus {
    /// Display/persistence code for this status. `Ok` is `"ok"`; error tags
    /// use the conventional spreadsheet error codes.
    pub fn code(&self) -> &'static str {
        match self {
            CellStatus::Ok(_) => "ok",
            CellStatus::DivisionByZero => "#DIV/0!",
            CellStatus::CircularReference => "#CYCLE!",
            CellStatus::UnresolvedReference => "#REF!",
            CellStatus::ParseFailure => "#PARSE!",
            CellStatus::TypeMismatch => "#VALUE!",
        }
    }

    /// Rebuild a status from its persisted `(code, result)` pair.
    pub fn from_code(code: &str, result: Option<f64>) -> Option<Self> {
        match code {
            "ok" => Some(CellStatus::Ok(result?)),
            "#DIV/0!" => Some(CellStatus::DivisionByZero),
            "#CYCLE!" => Some(CellStatus::CircularReference),
            "#REF!" => Some(CellStatus::UnresolvedReference),
            "#PARSE!" => Some(CellStatus::ParseFailure),
            "#VALUE!" => Some(CellStatus::TypeMismatch),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CellStatus::Ok(_))
    }

    /// The computed value, if evaluation succeeded.
    pub fn value(&self) -> Option<f64> {
        match self {
            CellStatus::Ok(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellStatus::Ok(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            other => write!(f, "{}", other.code()),
        }
    }
}

/// One cell of a row. Owned exclusively by its `Row`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub id: u64,
    pub name: String,
    pub sequence: u32,
    pub value: RawValue,
    pub formula: Option<String>,
    #[serde(rename = "cellType")]
    pub kind: CellKind,
    /// Cached calculated value. Written only by the evaluation engine; for
    /// number cells it mirrors the raw value, for text cells it stays `None`.
    #[serde(skip)]
    pub computed: Option<f64>,
    /// Result tag from the last recompute. `None` before the first pass and
    /// for text cells.
    #[serde(skip)]
    pub status: Option<CellStatus>,
}

impl Cell {
    pub fn number(id: u64, name: impl Into<String>, sequence: u32, value: f64) -> Self {
        Self {
            id,
            name: name.into(),
            sequence,
            value: RawValue::Number(value),
            formula: None,
            kind: CellKind::Number,
            computed: None,
            status: None,
        }
    }

    pub fn text(id: u64, name: impl Into<String>, sequence: u32, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sequence,
            value: RawValue::Text(value.into()),
            formula: None,
            kind: CellKind::Text,
            computed: None,
            status: None,
        }
    }

    pub fn formula(id: u64, name: impl Into<String>, sequence: u32, source: &str) -> Self {
        let mut cell = Self {
            id,
            name: name.into(),
            sequence,
            value: RawValue::Number(0.0),
            formula: None,
            kind: CellKind::Formula,
            computed: None,
            status: None,
        };
        cell.set_formula(source);
        cell
    }

    /// Replace this cell's formula. Stored with a leading `=`; input with or
    /// without it is accepted. Clears cached evaluation state.
    pub fn set_formula(&mut self, source: &str) {
        let trimmed = source.trim();
        let normalized = if trimmed.starts_with('=') {
            trimmed.to_string()
        } else {
            format!("={}", trimmed)
        };
        self.formula = Some(normalized);
        self.kind = CellKind::Formula;
        self.computed = None;
        self.status = None;
    }

    /// Replace this cell with a literal number, dropping any formula.
    pub fn set_number(&mut self, value: f64) {
        self.value = RawValue::Number(value);
        self.formula = None;
        self.kind = CellKind::Number;
        self.computed = None;
        self.status = None;
    }

    /// The formula body without the leading `=`, if this is a formula cell.
    pub fn formula_body(&self) -> Option<&str> {
        self.formula
            .as_deref()
            .map(|f| f.strip_prefix('=').unwrap_or(f))
    }
}
