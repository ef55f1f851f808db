//! Filter construction for stock and account queries.
//!
//! Filters are typed values rendered to a WHERE fragment with placeholders and
//! a matching argument list. User input only ever travels as a bound argument.

use crate::domain::error::StsError;

/// Placeholder syntax of the target backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?1, ?2, ...` (SQLite)
    Question,
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
}

impl Placeholder {
    fn render(&self, index: usize) -> String {
        match self {
            Placeholder::Question => format!("?{index}"),
            Placeholder::Dollar => format!("${index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

/// A rendered WHERE fragment. An empty `sql` selects every row.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl SqlPredicate {
    pub fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

struct Builder {
    style: Placeholder,
    clauses: Vec<String>,
    args: Vec<SqlArg>,
}

impl Builder {
    fn new(style: Placeholder) -> Self {
        Self {
            style,
            clauses: Vec::new(),
            args: Vec::new(),
        }
    }

    fn bind(&mut self, arg: SqlArg) -> String {
        self.args.push(arg);
        self.style.render(self.args.len())
    }

    fn and(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn finish(self) -> SqlPredicate {
        SqlPredicate {
            sql: self.clauses.join(" AND "),
            args: self.args,
        }
    }
}

/// Validate a privilege path segment as a non-negative integer.
pub fn parse_privilege(raw: &str) -> Result<u32, StsError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| StsError::validation("privilege", format!("'{raw}' is not a non-negative integer")))
}

/// Interleave wildcards around every character of `term`.
///
/// `"AB"` becomes `%A%B%`, `"X"` becomes `%X%` and the empty term becomes `%`.
/// LIKE metacharacters in the term are escaped with `\`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() * 2 + 1);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
        pattern.push('%');
    }
    pattern
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockFilter {
    pub max_privilege: Option<u32>,
    pub code: Option<String>,
    pub search: Option<String>,
}

impl StockFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn under_privilege(max_privilege: u32) -> Self {
        Self {
            max_privilege: Some(max_privilege),
            ..Self::default()
        }
    }

    /// Restrict to stocks whose code or name contains `term`'s characters in order.
    pub fn matching(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn to_predicate(&self, style: Placeholder) -> SqlPredicate {
        let mut b = Builder::new(style);
        if let Some(max) = self.max_privilege {
            let p = b.bind(SqlArg::Int(i64::from(max)));
            b.and(format!("stock_priv <= {p}"));
        }
        if let Some(term) = &self.search {
            let p = b.bind(SqlArg::Text(like_pattern(term)));
            b.and(format!(
                "(stock_code LIKE {p} ESCAPE '\\' OR stock_name LIKE {p} ESCAPE '\\')"
            ));
        }
        if let Some(code) = &self.code {
            let p = b.bind(SqlArg::Text(code.clone()));
            b.and(format!("stock_code = {p}"));
        }
        b.finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecuritiesFilter {
    pub securities_id: Option<i64>,
}

impl SecuritiesFilter {
    pub fn to_predicate(&self, style: Placeholder) -> SqlPredicate {
        let mut b = Builder::new(style);
        if let Some(id) = self.securities_id {
            let p = b.bind(SqlArg::Int(id));
            b.and(format!("securities_id = {p}"));
        }
        b.finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FundFilter {
    pub fund_id: Option<i64>,
    pub securities_id: Option<i64>,
    pub active_only: bool,
}

impl FundFilter {
    pub fn to_predicate(&self, style: Placeholder) -> SqlPredicate {
        let mut b = Builder::new(style);
        if let Some(id) = self.fund_id {
            let p = b.bind(SqlArg::Int(id));
            b.and(format!("fund_id = {p}"));
        }
        if let Some(id) = self.securities_id {
            let p = b.bind(SqlArg::Int(id));
            b.and(format!("securities_id = {p}"));
        }
        if self.active_only {
            b.and("state = TRUE".to_string());
        }
        b.finish()
    }
}
