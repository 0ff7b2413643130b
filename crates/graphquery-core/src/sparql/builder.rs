//! Query text for every structural, lexical and detail lookup
//!
//! Builders return complete queries including the prefix prologue. Tokens are
//! escaped for XPath regular expressions before they are embedded in
//! `regex()` calls and IRIs are checked before they are embedded in `<...>`.

use crate::config::{Prefixes, is_absolute_iri};
use crate::error::{Error, Result};
use crate::search::SearchStrategy;

/// Label filter for the given strategy
///
/// `Exact` requires every token. `Partial` accepts labels matching all but
/// the last token, all but the first, or (beyond three tokens) the middle
/// run; it is `None` for fewer than two tokens since it would equal `Exact`.
pub fn label_filter(tokens: &[String], strategy: SearchStrategy) -> Option<String> {
    match strategy {
        SearchStrategy::Exact => (!tokens.is_empty()).then(|| all_tokens(tokens)),
        SearchStrategy::Partial => {
            if tokens.len() < 2 {
                return None;
            }
            let n = tokens.len();
            let mut alternatives = vec![all_tokens(&tokens[..n - 1]), all_tokens(&tokens[1..])];
            if n > 3 {
                alternatives.push(all_tokens(&tokens[1..n - 1]));
            }
            Some(alternatives.join(" || "))
        }
    }
}

/// Entities matching the label filter, ranked by distinct incoming relations
pub fn relation_search(
    prefixes: &Prefixes,
    tokens: &[String],
    strategy: SearchStrategy,
    limit: usize,
) -> Option<String> {
    let filter = label_filter(tokens, strategy)?;
    Some(format!(
        "{prologue}\n\
         SELECT ?o (SAMPLE(?label) AS ?name) (COUNT(DISTINCT ?r) AS ?relationCount) WHERE {{\n  \
           ?o rdfs:label ?label .\n  \
           FILTER(({filter}) && STRSTARTS(STR(?o), \"{ns}\"))\n  \
           ?s ?r ?o .\n\
         }}\n\
         GROUP BY ?o\n\
         ORDER BY DESC(?relationCount)\n\
         LIMIT {limit}",
        prologue = prefixes.prologue(),
        ns = string_literal(&prefixes.entity),
    ))
}

/// Entities whose label matches the filter
pub fn text_search(
    prefixes: &Prefixes,
    tokens: &[String],
    strategy: SearchStrategy,
    limit: usize,
) -> Option<String> {
    let filter = label_filter(tokens, strategy)?;
    Some(format!(
        "{prologue}\n\
         SELECT ?o (SAMPLE(?label) AS ?name) WHERE {{\n  \
           ?o rdfs:label ?label .\n  \
           FILTER(({filter}) && STRSTARTS(STR(?o), \"{ns}\"))\n\
         }}\n\
         GROUP BY ?o\n\
         ORDER BY ?o\n\
         LIMIT {limit}",
        prologue = prefixes.prologue(),
        ns = string_literal(&prefixes.entity),
    ))
}

/// Label of one entity
pub fn entity_label(prefixes: &Prefixes, entity: &str) -> Result<String> {
    Ok(format!(
        "{}\nSELECT ?label WHERE {{ {} rdfs:label ?label . }} LIMIT 1",
        prefixes.prologue(),
        iri(entity)?
    ))
}

/// Entities with an edge pointing at `entity`
pub fn income_entities(prefixes: &Prefixes, entity: &str) -> Result<String> {
    Ok(format!(
        "{}\nSELECT DISTINCT ?a WHERE {{ ?a ?p {} . FILTER(STRSTARTS(STR(?a), \"{}\")) }}",
        prefixes.prologue(),
        iri(entity)?,
        string_literal(&prefixes.entity)
    ))
}

/// Entities `entity` points at
pub fn outcome_entities(prefixes: &Prefixes, entity: &str) -> Result<String> {
    Ok(format!(
        "{}\nSELECT DISTINCT ?b WHERE {{ {} ?p ?b . FILTER(STRSTARTS(STR(?b), \"{}\")) }}",
        prefixes.prologue(),
        iri(entity)?,
        string_literal(&prefixes.entity)
    ))
}

/// Category resources linked from `entity`
pub fn categories(prefixes: &Prefixes, entity: &str) -> Result<String> {
    Ok(format!(
        "{}\nSELECT DISTINCT ?b WHERE {{ {} ?p ?b . FILTER(STRSTARTS(STR(?b), \"{}\")) }}",
        prefixes.prologue(),
        iri(entity)?,
        string_literal(&prefixes.category)
    ))
}

/// Ontology classes of `entity` via the typing predicate
pub fn ontology_links(prefixes: &Prefixes, entity: &str) -> Result<String> {
    let predicate = prefixes
        .type_iri()
        .map_err(|e| Error::MalformedResponse(e.to_string()))?;
    Ok(format!(
        "{}\nSELECT DISTINCT ?b WHERE {{ {} {} ?b . }}",
        prefixes.prologue(),
        iri(entity)?,
        iri(&predicate)?
    ))
}

/// Entities linked to every given class and category
///
/// `None` when there is nothing to constrain on.
pub fn similar_entities(
    prefixes: &Prefixes,
    ontology: &[String],
    categories: &[String],
    limit: usize,
) -> Result<Option<String>> {
    if ontology.is_empty() && categories.is_empty() {
        return Ok(None);
    }
    let mut patterns = Vec::with_capacity(ontology.len() + categories.len());
    for (i, class) in ontology.iter().enumerate() {
        patterns.push(format!("?s ?p{} {} .", (i + 1) * 100, iri(class)?));
    }
    for (i, category) in categories.iter().enumerate() {
        patterns.push(format!("?s ?p{} {} .", i + 1, iri(category)?));
    }
    Ok(Some(format!(
        "{}\nSELECT DISTINCT ?s WHERE {{ {} }} ORDER BY ?s LIMIT {}",
        prefixes.prologue(),
        patterns.join(" "),
        limit
    )))
}

/// Every OWL class with its label
pub fn class_labels(prefixes: &Prefixes) -> String {
    format!(
        "{}\nSELECT DISTINCT ?class ?label WHERE {{ ?class rdf:type owl:Class . ?class rdfs:label ?label . }}",
        prefixes.prologue()
    )
}

/// Cheapest query that proves the endpoint answers
pub fn ping() -> &'static str {
    "SELECT ?s WHERE { ?s ?p ?o } LIMIT 1"
}

fn all_tokens(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| {
            format!(
                "regex(?label, \"{}\", \"i\")",
                string_literal(&xpath_escape(token))
            )
        })
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Backslash-escape the metacharacters of XPath regular expressions
///
/// Query tokens are alphanumeric after normalization, so this only changes
/// tokens built by other callers.
fn xpath_escape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(
            c,
            '\\' | '|' | '.' | '?' | '*' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '-'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape text for a double-quoted SPARQL string literal
fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn iri(value: &str) -> Result<String> {
    if is_absolute_iri(value) {
        Ok(format!("<{}>", value))
    } else {
        Err(Error::MalformedResponse(format!(
            "'{}' is not an IRI that can be queried",
            value
        )))
    }
}
