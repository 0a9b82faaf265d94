// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory register storage with per-read sample sequences
//!
//! Every register holds a sequence of words rather than a single word. Each
//! read starting at a given address advances that address's cursor, and all
//! words of the block are taken at the same cursor, so multi-word values stay
//! consistent while still changing between samples.

use std::collections::HashMap;

use log::error;
use tokio_modbus::ExceptionCode;

use crate::registers::{encode, Encoding, ReadFunction};

type Key = (ReadFunction, u16);

#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    registers: HashMap<Key, Vec<u16>>,
    cursors: HashMap<Key, usize>,
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a register to a constant word.
    pub fn set_word(&mut self, function: ReadFunction, address: u16, word: u16) -> &mut Self {
        self.registers.insert((function, address), vec![word]);
        self
    }

    /// Set a register to cycle through `samples` on successive reads.
    pub fn set_samples(&mut self, function: ReadFunction, address: u16, samples: &[u16]) -> &mut Self {
        if !samples.is_empty() {
            self.registers.insert((function, address), samples.to_vec());
        }
        self
    }

    /// Store a sequence of decoded values starting at `address`, encoded the
    /// way a device would.
    pub fn set_values(
        &mut self,
        function: ReadFunction,
        address: u16,
        encoding: Encoding,
        scale: f64,
        values: &[f64],
    ) -> &mut Self {
        let encoded: Vec<Vec<u16>> = values
            .iter()
            .map(|value| encode(*value, encoding, scale))
            .collect();
        for offset in 0..encoding.word_count() {
            let Some(register) = u16::try_from(offset)
                .ok()
                .and_then(|offset| address.checked_add(offset))
            else {
                break;
            };
            let samples: Vec<u16> = encoded.iter().map(|words| words[offset]).collect();
            self.set_samples(function, register, &samples);
        }
        self
    }

    /// Store `text` as packed ASCII, two characters per word, padded with
    /// null bytes to `words` registers.
    pub fn set_ascii(&mut self, function: ReadFunction, address: u16, text: &str, words: u16) -> &mut Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(usize::from(words) * 2, 0);
        for (offset, pair) in bytes.chunks_exact(2).enumerate() {
            let Some(register) = u16::try_from(offset)
                .ok()
                .and_then(|offset| address.checked_add(offset))
            else {
                break;
            };
            self.set_word(function, register, u16::from_be_bytes([pair[0], pair[1]]));
        }
        self
    }

    pub fn contains(&self, function: ReadFunction, address: u16) -> bool {
        self.registers.contains_key(&(function, address))
    }

    /// Read `count` registers starting at `address`.
    ///
    /// Unmapped registers answer with an illegal data address exception,
    /// the way real devices do.
    pub fn read(
        &mut self,
        function: ReadFunction,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let cursor = *self.cursors.get(&(function, address)).unwrap_or(&0);

        let mut response_values = Vec::with_capacity(usize::from(count));
        for i in 0..count {
            let Some(reg_addr) = address.checked_add(i) else {
                error!("SERVER: Exception::IllegalDataAddress");
                return Err(ExceptionCode::IllegalDataAddress);
            };
            match self.registers.get(&(function, reg_addr)) {
                Some(samples) => response_values.push(samples[cursor % samples.len()]),
                None => {
                    error!("SERVER: Exception::IllegalDataAddress");
                    return Err(ExceptionCode::IllegalDataAddress);
                }
            }
        }

        self.cursors.insert((function, address), cursor + 1);
        Ok(response_values)
    }
}
