// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpaces.
//
// LindaSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpaces. If not, see <https://www.gnu.org/licenses/>.

//! Template matching strategies
//!
//! ## Purpose
//! A [`Matcher`] is a pure predicate deciding whether a candidate tuple
//! satisfies a template. Strategies are swappable per store instance via
//! `TupleStore::set_matcher`; the store consults the matcher on every
//! match attempt.
//!
//! The [`Tuple::MatchAll`](crate::tuple::Tuple::MatchAll) sentinel is
//! handled by the store itself and short-circuits whichever strategy is
//! configured: the first candidate encountered is accepted without the
//! matcher ever being invoked.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::StoreError;
use crate::tuple::{Field, Tuple};

/// Pure predicate comparing a candidate value to a template.
pub trait Matcher: Send + Sync {
    /// True iff `candidate` satisfies `template`.
    fn matches(&self, candidate: &Tuple, template: &Tuple) -> bool;
}

/// Positional matching over same-arity field sequences.
///
/// Every template field must equal the candidate field at its position,
/// or be [`Field::Wildcard`]. Arity mismatch never matches, and only
/// [`Tuple::Seq`] shapes participate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalMatcher;

impl Matcher for PositionalMatcher {
    fn matches(&self, candidate: &Tuple, template: &Tuple) -> bool {
        let (Tuple::Seq(cand), Tuple::Seq(tmpl)) = (candidate, template) else {
            return false;
        };
        cand.len() == tmpl.len()
            && tmpl
                .iter()
                .zip(cand)
                .all(|(t, c)| matches!(t, Field::Wildcard) || t == c)
    }
}

/// Field-by-field matching of declared fields (the default strategy).
///
/// Positional shapes fall back to [`PositionalMatcher`] rules. Two records
/// with the same tag match when every declared template field accepts the
/// candidate field of the same name, where [`Field::Null`] and
/// [`Field::Wildcard`] accept anything. A record template whose field-name
/// set is a strict subset of the candidate's acts as a structural
/// supertype and matches unconditionally, regardless of tag. Anything
/// else, including mixed shapes, never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMatcher;

impl Matcher for FieldMatcher {
    fn matches(&self, candidate: &Tuple, template: &Tuple) -> bool {
        match (candidate, template) {
            (Tuple::Seq(_), Tuple::Seq(_)) => PositionalMatcher.matches(candidate, template),
            (
                Tuple::Record {
                    tag: cand_tag,
                    fields: cand,
                },
                Tuple::Record {
                    tag: tmpl_tag,
                    fields: tmpl,
                },
            ) => {
                if cand_tag == tmpl_tag && cand.len() == tmpl.len() {
                    tmpl.iter()
                        .zip(cand)
                        .all(|((tn, tf), (cn, cf))| tn == cn && (tf.is_wild() || tf == cf))
                } else {
                    is_strict_field_subset(tmpl, cand)
                }
            }
            _ => false,
        }
    }
}

/// True when every template field name appears among the candidate's and
/// the template declares strictly fewer fields.
fn is_strict_field_subset(template: &[(String, Field)], candidate: &[(String, Field)]) -> bool {
    template.len() < candidate.len()
        && template
            .iter()
            .all(|(tn, _)| candidate.iter().any(|(cn, _)| cn == tn))
}

type FieldPredicate = Arc<dyn Fn(&Field) -> bool + Send + Sync>;

/// Per-field predicate matching, independent of template data.
///
/// Holds an ordered set of field-name → predicate pairs and accepts a
/// candidate iff every named field exists and passes its predicate. The
/// template argument carries no information for this strategy; call sites
/// conventionally pass [`PredicateMatcher::template`]. Field names resolve
/// the way [`Tuple::field`] does, so positional fields are addressed by
/// decimal index.
#[derive(Clone, Default)]
pub struct PredicateMatcher {
    predicates: Vec<(String, FieldPredicate)>,
}

impl PredicateMatcher {
    /// Matcher with no predicates; accepts every candidate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an arbitrary predicate on the named field.
    pub fn with_predicate<F>(mut self, field: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Field) -> bool + Send + Sync + 'static,
    {
        self.predicates.push((field.into(), Arc::new(predicate)));
        self
    }

    /// Adds a regex predicate tested against the field's string form,
    /// anchored at the start (the pattern must match a prefix, not
    /// necessarily the whole text).
    pub fn with_regex(
        self,
        field: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, StoreError> {
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            StoreError::InvalidConfiguration(format!("invalid field pattern: {}", e))
        })?;
        Ok(self.with_predicate(field, move |f| regex.is_match(&f.to_string())))
    }

    /// Neutral template for stores driven by this strategy. The matcher
    /// ignores template contents, so any tuple works; the empty tuple is
    /// the convention.
    pub fn template() -> Tuple {
        Tuple::empty()
    }
}

impl Matcher for PredicateMatcher {
    fn matches(&self, candidate: &Tuple, _template: &Tuple) -> bool {
        self.predicates
            .iter()
            .all(|(name, pred)| candidate.field(name).is_some_and(|f| pred(f)))
    }
}

impl fmt::Debug for PredicateMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.predicates.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("PredicateMatcher")
            .field("fields", &names)
            .finish()
    }
}
