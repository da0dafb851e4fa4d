//! Query compilation: one unit plus one search form becomes one
//! [`PrerolledQuery`].
//!
//! Three booleans pick one of six templates:
//!
//! | temp table | phrase | bounded | template |
//! |---|---|---|---|
//! | no  | no  | no  | [`Template::Plain`] |
//! | no  | no  | yes | [`Template::Bounded`] |
//! | no  | yes | no  | [`Template::Windowed`] |
//! | no  | yes | yes | [`Template::WindowedBounded`] |
//! | yes | no  | -   | [`Template::TempTable`] |
//! | yes | yes | -   | [`Template::WindowedTempTable`] |
//!
//! Every template orders by ascending line index and carries a `LIMIT` one
//! past the cap, so a table that fills the cap still reads as truncated.

use roaring::RoaringTreemap;
use serde::Serialize;

use crate::corpus::{AuthorId, CorpusMetadata};
use crate::resolver::Unit;
use crate::selection::Boundary;
use crate::storage::{LINE_COLUMNS, SearchColumn};
use crate::term::{ExpandedTerm, SearchForm};

pub type SearchId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Template {
    Plain,
    Bounded,
    Windowed,
    WindowedBounded,
    TempTable,
    WindowedTempTable,
}

impl Template {
    pub fn select(needs_temp_table: bool, phrase: bool, bounded: bool) -> Self {
        match (needs_temp_table, phrase, bounded) {
            (true, false, _) => Template::TempTable,
            (true, true, _) => Template::WindowedTempTable,
            (false, false, false) => Template::Plain,
            (false, false, true) => Template::Bounded,
            (false, true, false) => Template::Windowed,
            (false, true, true) => Template::WindowedBounded,
        }
    }

    pub fn is_windowed(&self) -> bool {
        matches!(
            self,
            Template::Windowed | Template::WindowedBounded | Template::WindowedTempTable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempTable {
    pub name: String,
    pub ddl: String,
    pub rows: u64,
}

/// A fully compiled, ready-to-execute unit of search work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrerolledQuery {
    pub search: SearchId,
    pub table: AuthorId,
    pub template: Template,
    pub temp_table: Option<TempTable>,
    pub sql: String,
    pub bind: Option<String>,
}

// ------------- Predicates -------------
pub fn inclusion_clause(bounds: &[Boundary]) -> String {
    bounds
        .iter()
        .map(|b| format!(r#"("index" BETWEEN {} AND {})"#, b.start, b.stop))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub fn exclusion_clause(bounds: &[Boundary]) -> String {
    bounds
        .iter()
        .map(|b| format!(r#"("index" NOT BETWEEN {} AND {})"#, b.start, b.stop))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn boundary_filter(unit: &Unit) -> Option<String> {
    match (unit.inclusions.is_empty(), unit.exclusions.is_empty()) {
        (true, true) => None,
        (false, true) => Some(format!("({})", inclusion_clause(&unit.inclusions))),
        (true, false) => Some(exclusion_clause(&unit.exclusions)),
        (false, false) => Some(format!(
            "({}) AND {}",
            inclusion_clause(&unit.inclusions),
            exclusion_clause(&unit.exclusions)
        )),
    }
}

fn where_clause(predicates: &[String]) -> String {
    if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    }
}

fn as_line(index: i64) -> u64 {
    index.max(0) as u64
}

// ------------- Planner -------------
/// Compiles units for one pass of one search.
pub struct QueryPlanner<'a> {
    pub search: SearchId,
    pub phase: u8,
    pub column: SearchColumn,
    pub limit: usize,
    pub temp_table_threshold: usize,
    pub corpus: &'a dyn CorpusMetadata,
}

impl QueryPlanner<'_> {
    pub fn compile_all(&self, units: &[Unit], term: &ExpandedTerm) -> Vec<PrerolledQuery> {
        let mut queries = Vec::with_capacity(units.len() * term.forms.len());
        for (slot, form) in term.forms.iter().enumerate() {
            for unit in units {
                queries.push(self.compile(unit, form, slot));
            }
        }
        queries
    }

    pub fn compile(&self, unit: &Unit, form: &SearchForm, slot: usize) -> PrerolledQuery {
        let author = unit.author.as_str();
        let column = self.column.sql_name();
        let bounded = unit.boundary_count() > 0;
        let covered = if unit.boundary_count() > self.temp_table_threshold {
            self.covered_indices(unit)
        } else {
            None
        };
        let template = Template::select(covered.is_some(), form.phrase, bounded);

        let temp_table = covered.map(|covered| {
            let name = format!(
                "{author}_includelist_{}_{}_{slot}",
                self.search, self.phase
            );
            let listed = covered
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",");
            TempTable {
                ddl: format!(
                    r#"CREATE TEMP TABLE "{name}" (includeindex INTEGER PRIMARY KEY); INSERT INTO temp."{name}" (includeindex) SELECT value FROM json_each('[{listed}]');"#
                ),
                rows: covered.len(),
                name,
            }
        });

        let mut filters = Vec::new();
        if let Some(temp) = &temp_table {
            filters.push(format!(
                r#"EXISTS (SELECT 1 FROM temp."{}" incl WHERE incl.includeindex = {author}."index")"#,
                temp.name
            ));
        } else if let Some(filter) = boundary_filter(unit) {
            filters.push(filter);
        }

        let bind = (!form.pattern.is_empty()).then(|| form.pattern.clone());
        let limit = self.limit.saturating_add(1).min(i64::MAX as usize);
        let sql = if template.is_windowed() {
            let inner = format!(
                r#"SELECT {LINE_COLUMNS}, ({column} || ' ' || COALESCE(LEAD({column}) OVER (ORDER BY "index" ASC), '')) AS linebundle FROM {author}{}"#,
                where_clause(&filters)
            );
            let matching: Vec<String> = bind
                .iter()
                .map(|_| "second.linebundle REGEXP ?1".to_string())
                .collect();
            format!(
                r#"SELECT {LINE_COLUMNS} FROM ({inner}) second{} ORDER BY "index" ASC LIMIT {limit}"#,
                where_clause(&matching)
            )
        } else {
            if bind.is_some() {
                filters.push(format!("{column} REGEXP ?1"));
            }
            format!(
                r#"SELECT {LINE_COLUMNS} FROM {author}{} ORDER BY "index" ASC LIMIT {limit}"#,
                where_clause(&filters)
            )
        };

        PrerolledQuery {
            search: self.search,
            table: unit.author.clone(),
            template,
            temp_table,
            sql,
            bind,
        }
    }

    /// Every line index the unit covers: its inclusions, or the author's
    /// whole range, minus its exclusions. `None` when there is nothing to
    /// start from.
    pub fn covered_indices(&self, unit: &Unit) -> Option<RoaringTreemap> {
        let mut covered = RoaringTreemap::new();
        if unit.inclusions.is_empty() {
            let (first, last) = self.corpus.line_range(&unit.author)?;
            covered.insert_range(as_line(first)..=as_line(last));
        } else {
            for b in &unit.inclusions {
                covered.insert_range(as_line(b.start)..=as_line(b.stop));
            }
        }
        for b in &unit.exclusions {
            covered.remove_range(as_line(b.start)..=as_line(b.stop));
        }
        Some(covered)
    }
}
