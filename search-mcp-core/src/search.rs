// search-mcp-core/src/search.rs
// ============================================================================
// Module: Catalog Search
// Description: Text scoring over the aggregated tool catalog.
// Purpose: Let clients discover tools without paying for the full catalog.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Catalog search scores tools against a query in one of four modes. Name
//! matches weigh double; fuzzy matching uses per-word Levenshtein similarity.
//! Tests pin the orderings these scores produce, not the absolute numbers, so
//! the weights can evolve.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::AggregatedTool;
use crate::catalog::Catalog;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum per-word similarity accepted in fuzzy mode.
const FUZZY_SIMILARITY_FLOOR: f64 = 0.6;
/// Weight multiplier applied to name-field scores.
const NAME_WEIGHT: f64 = 2.0;
/// Default result page size.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Match mode for catalog search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Substring match anywhere in the field.
    Partial,
    /// Field must start with the query.
    Prefix,
    /// Field must equal the query.
    Exact,
    /// Per-word Levenshtein similarity match.
    Fuzzy,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Partial
    }
}

/// Fields considered when scoring a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// Qualified tool name.
    Name,
    /// Tool description.
    Description,
}

/// Search request options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Match mode.
    pub mode: SearchMode,
    /// Case-sensitive comparison when true.
    pub case_sensitive: bool,
    /// Fields to score; both when empty.
    pub fields: Vec<SearchField>,
    /// Restrict matches to one backend when set.
    pub backend: Option<String>,
    /// Attach input schemas to hits; off by default for context economy.
    pub include_schema: bool,
    /// Maximum results returned.
    pub limit: usize,
    /// Results skipped before the first returned entry.
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Partial,
            case_sensitive: false,
            fields: Vec::new(),
            backend: None,
            include_schema: false,
            limit: DEFAULT_SEARCH_LIMIT,
            offset: 0,
        }
    }
}

/// One scored search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Qualified tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Owning backend name.
    pub backend: String,
    /// Relative match score; omitted for empty queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Input schema, attached only on request.
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Search response with pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// Page of scored hits.
    pub tools: Vec<SearchHit>,
    /// Total matches before pagination.
    pub total: usize,
    /// Applied page size.
    pub limit: usize,
    /// Applied offset.
    pub offset: usize,
}

// ============================================================================
// SECTION: Search
// ============================================================================

/// Scores the catalog against a query and returns a result page.
///
/// An empty query returns the whole catalog in insertion order, paginated
/// and unscored.
#[must_use]
pub fn search_catalog(catalog: &Catalog, query: &str, options: &SearchOptions) -> SearchResults {
    let scoped: Vec<&AggregatedTool> = catalog
        .values()
        .filter(|tool| {
            options.backend.as_deref().is_none_or(|backend| tool.backend == backend)
        })
        .collect();

    if query.is_empty() {
        let total = scoped.len();
        let tools = scoped
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .map(|tool| hit(tool, None, options.include_schema))
            .collect();
        return SearchResults {
            tools,
            total,
            limit: options.limit,
            offset: options.offset,
        };
    }

    let mut scored: Vec<(f64, &AggregatedTool)> = scoped
        .into_iter()
        .filter_map(|tool| {
            let score = score_tool(tool, query, options);
            (score > 0.0).then_some((score, tool))
        })
        .collect();
    scored.sort_by(|left, right| {
        right
            .0
            .partial_cmp(&left.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.1.qualified_name.cmp(&right.1.qualified_name))
    });

    let total = scored.len();
    let tools = scored
        .into_iter()
        .skip(options.offset)
        .take(options.limit)
        .map(|(score, tool)| hit(tool, Some(score), options.include_schema))
        .collect();
    SearchResults {
        tools,
        total,
        limit: options.limit,
        offset: options.offset,
    }
}

fn hit(tool: &AggregatedTool, score: Option<f64>, include_schema: bool) -> SearchHit {
    SearchHit {
        name: tool.qualified_name.clone(),
        description: tool.description.clone(),
        backend: tool.backend.clone(),
        score,
        input_schema: include_schema.then(|| tool.input_schema.clone()).flatten(),
    }
}

/// Scores one tool across the selected fields.
fn score_tool(tool: &AggregatedTool, query: &str, options: &SearchOptions) -> f64 {
    let score_name = options.fields.is_empty() || options.fields.contains(&SearchField::Name);
    let score_description =
        options.fields.is_empty() || options.fields.contains(&SearchField::Description);
    let mut score = 0.0;
    if score_name {
        score += NAME_WEIGHT
            * field_score(&tool.qualified_name, query, options.mode, options.case_sensitive);
    }
    if score_description {
        score += field_score(&tool.description, query, options.mode, options.case_sensitive);
    }
    score
}

/// Scores one field against the query for the given mode.
fn field_score(field: &str, query: &str, mode: SearchMode, case_sensitive: bool) -> f64 {
    let (field_cmp, query_cmp) = if case_sensitive {
        (field.to_string(), query.to_string())
    } else {
        (field.to_lowercase(), query.to_lowercase())
    };
    match mode {
        SearchMode::Exact => {
            if field_cmp == query_cmp {
                100.0
            } else {
                0.0
            }
        }
        SearchMode::Prefix => {
            if field_cmp.starts_with(&query_cmp) {
                80.0
            } else {
                0.0
            }
        }
        SearchMode::Partial => partial_score(&field_cmp, &query_cmp),
        SearchMode::Fuzzy => fuzzy_score(&field_cmp, &query_cmp),
    }
}

/// Substring score: exact and prefix hits rank above interior hits.
fn partial_score(field: &str, query: &str) -> f64 {
    if field == query {
        100.0
    } else if field.starts_with(query) {
        80.0
    } else if field.contains(query) {
        50.0
    } else {
        0.0
    }
}

/// Per-word fuzzy score: the best word similarity above the floor, capped
/// below every non-fuzzy tier.
fn fuzzy_score(field: &str, query: &str) -> f64 {
    let best = field
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| similarity(word, query))
        .fold(0.0_f64, f64::max);
    if best >= FUZZY_SIMILARITY_FLOOR {
        best * 40.0
    } else {
        0.0
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`.
fn similarity(left: &str, right: &str) -> f64 {
    let max_len = left.chars().count().max(right.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(left, right);
    1.0 - (distance as f64 / max_len as f64)
}

/// Levenshtein edit distance over characters.
fn levenshtein(left: &str, right: &str) -> usize {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0usize; right.len() + 1];
    for (i, left_ch) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, right_ch) in right.iter().enumerate() {
            let substitution = usize::from(left_ch != right_ch);
            current[j + 1] = (previous[j] + substitution)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

// ============================================================================
// SECTION: Tests
// ============================================================================
