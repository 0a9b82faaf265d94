// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Line-oriented operator prompts
//!
//! Asks for reference readings, candidate picks and conflict decisions on
//! any reader/writer pair. The binary wires it to stdin and stdout.

use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use log::warn;

use crate::catalog::Catalog;
use crate::reconcile::{ConflictResolver, RegisterConflict, Resolution};
use crate::scanner::{CandidateSelector, CandidateStat, ExpectedValues, SCAN_TARGETS};
use crate::units::ExpectedReading;

pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one trimmed line. `None` on end of input.
    fn ask(&mut self, question: &str) -> Option<String> {
        if write!(self.output, "{}", question)
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return None;
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Ask for a reading of every scan target that does not have one yet.
    ///
    /// The catalog's prompt text and input unit are used when present; an
    /// empty answer skips the metric.
    pub fn ask_expected_values(&mut self, catalog: &Catalog, expected: &mut ExpectedValues) {
        for metric_id in SCAN_TARGETS {
            if expected.contains_key(metric_id) {
                continue;
            }
            let Some(definition) = catalog.get(metric_id) else {
                continue;
            };
            let hint = definition.discovery.as_ref();
            let unit = hint
                .and_then(|h| h.input_unit.clone())
                .or_else(|| definition.unit.clone());
            let question = hint.and_then(|h| h.prompt.clone()).unwrap_or_else(|| {
                format!(
                    "{} ({}) [press Enter to skip]: ",
                    definition.name,
                    unit.as_deref().unwrap_or("-")
                )
            });

            loop {
                let Some(answer) = self.ask(&question) else {
                    return;
                };
                if answer.is_empty() {
                    break;
                }
                match answer.parse::<ExpectedReading>() {
                    Ok(mut reading) => {
                        if reading.unit.is_none() {
                            reading.unit = unit.clone();
                        }
                        expected.insert(metric_id.to_string(), reading);
                        break;
                    }
                    Err(err) => {
                        let _ = writeln!(self.output, "{}", err);
                    }
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> CandidateSelector for Prompt<R, W> {
    fn select(&mut self, metric_id: &str, candidates: &[CandidateStat]) -> Option<u16> {
        let _ = writeln!(self.output, "Candidates for {}:", metric_id);
        for (rank, candidate) in candidates.iter().enumerate() {
            let _ = writeln!(
                self.output,
                "  {}. register {} avg {:.1} (min {:.1}, max {:.1}, {} sign changes)",
                rank + 1,
                candidate.register,
                candidate.average,
                candidate.min,
                candidate.max,
                candidate.sign_changes
            );
        }
        let answer = self.ask("Pick a number, or press Enter to skip: ")?;
        if answer.is_empty() {
            return None;
        }
        match answer.parse::<usize>() {
            Ok(rank) if (1..=candidates.len()).contains(&rank) => Some(candidates[rank - 1].register),
            _ => {
                warn!("Ignoring invalid candidate choice '{}'", answer);
                None
            }
        }
    }
}

impl<R: BufRead, W: Write> ConflictResolver for Prompt<R, W> {
    fn resolve(&mut self, conflict: &RegisterConflict) -> Resolution {
        let _ = writeln!(self.output, "Conflict on {}", conflict);
        match self.ask("Use catalog register instead? [y/N]: ") {
            Some(answer) if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") => {
                Resolution::RevertToCatalog
            }
            _ => Resolution::KeepDiscovered,
        }
    }
}

/// One prompt answering both candidate and conflict questions.
///
/// A session takes its selector and its resolver as separate borrows; two
/// handles on the same prompt keep a single reader on the input.
pub struct SharedPrompt<R, W>(Rc<RefCell<Prompt<R, W>>>);

impl<R, W> Clone for SharedPrompt<R, W> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<R: BufRead, W: Write> SharedPrompt<R, W> {
    pub fn new(prompt: Prompt<R, W>) -> Self {
        Self(Rc::new(RefCell::new(prompt)))
    }

    pub fn ask_expected_values(&self, catalog: &Catalog, expected: &mut ExpectedValues) {
        self.0.borrow_mut().ask_expected_values(catalog, expected);
    }
}

impl<R: BufRead, W: Write> CandidateSelector for SharedPrompt<R, W> {
    fn select(&mut self, metric_id: &str, candidates: &[CandidateStat]) -> Option<u16> {
        self.0.borrow_mut().select(metric_id, candidates)
    }
}

impl<R: BufRead, W: Write> ConflictResolver for SharedPrompt<R, W> {
    fn resolve(&mut self, conflict: &RegisterConflict) -> Resolution {
        self.0.borrow_mut().resolve(conflict)
    }
}
