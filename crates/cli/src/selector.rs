//! Location selector: turns `all | batch | incremental | <names>` into
//! the configured sources to run. Unknown names are a configuration
//! error, never silently ignored.

use anyhow::Result;

use epiwatch_core::adapter::normalize_location;

use crate::config::SourceEntry;

pub fn resolve<'a>(sources: &'a [SourceEntry], selector: &[String]) -> Result<Vec<&'a SourceEntry>> {
    if selector.is_empty() {
        return Ok(sources.iter().collect());
    }

    if selector.len() == 1 {
        match normalize_location(&selector[0]).as_str() {
            "all" => return Ok(sources.iter().collect()),
            "batch" => return Ok(sources.iter().filter(|s| s.spec.batch).collect()),
            "incremental" => return Ok(sources.iter().filter(|s| !s.spec.batch).collect()),
            _ => {}
        }
    }

    let wanted: Vec<String> = selector.iter().map(|s| normalize_location(s)).collect();
    let unknown: Vec<&String> = wanted
        .iter()
        .filter(|w| {
            !sources
                .iter()
                .any(|s| normalize_location(&s.spec.location) == **w)
        })
        .collect();
    if !unknown.is_empty() {
        let mut valid: Vec<String> = sources
            .iter()
            .map(|s| normalize_location(&s.spec.location))
            .collect();
        valid.sort();
        valid.dedup();
        anyhow::bail!(
            "invalid locations: {unknown:?}; valid locations are: {}",
            valid.join(", ")
        );
    }

    Ok(sources
        .iter()
        .filter(|s| wanted.contains(&normalize_location(&s.spec.location)))
        .collect())
}
