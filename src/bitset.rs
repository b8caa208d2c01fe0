// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;
use std::ops::{BitAndAssign, BitOrAssign};

const WORD_BITS: usize = u64::BITS as usize;

/// A set of integers drawn from the fixed universe `[0, capacity)`, packed
/// into machine words. Binary operations require operands of equal capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    capacity: usize,
    words: Vec<u64>,
}

impl BitSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            words: vec![0; (capacity + WORD_BITS - 1) / WORD_BITS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn validate_element(&self, element: usize) {
        if element >= self.capacity {
            panic!(
                "element {} is out of range for a set with capacity {}",
                element, self.capacity
            );
        }
    }

    fn validate_operand(&self, other: &Self) {
        if self.capacity != other.capacity {
            panic!(
                "capacity mismatch between set operands: {} vs {}",
                self.capacity, other.capacity
            );
        }
    }

    pub fn insert(&mut self, element: usize) -> bool {
        self.validate_element(element);
        let word = &mut self.words[element / WORD_BITS];
        let mask = 1u64 << (element % WORD_BITS);
        let was_absent = *word & mask == 0;
        *word |= mask;
        was_absent
    }

    pub fn remove(&mut self, element: usize) -> bool {
        self.validate_element(element);
        let word = &mut self.words[element / WORD_BITS];
        let mask = 1u64 << (element % WORD_BITS);
        let was_present = *word & mask != 0;
        *word &= !mask;
        was_present
    }

    pub fn contains(&self, element: usize) -> bool {
        self.validate_element(element);
        self.words[element / WORD_BITS] & (1u64 << (element % WORD_BITS)) != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.validate_operand(other);
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.validate_operand(other);
        Self {
            capacity: self.capacity,
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & !b)
                .collect(),
        }
    }

    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl BitOrAssign<&Self> for BitSet {
    fn bitor_assign(&mut self, rhs: &Self) {
        self.validate_operand(rhs);
        for (word, other) in self.words.iter_mut().zip(rhs.words.iter()) {
            *word |= other;
        }
    }
}

impl BitAndAssign<&Self> for BitSet {
    fn bitand_assign(&mut self, rhs: &Self) {
        self.validate_operand(rhs);
        for (word, other) in self.words.iter_mut().zip(rhs.words.iter()) {
            *word &= other;
        }
    }
}

pub struct BitSetIter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl<'a> Iterator for BitSetIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_index += 1;
            if self.word_index >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_index];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_index * WORD_BITS + bit)
    }
}

impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut set_string = "BitSet{".to_string();
        for (index, element) in self.iter().enumerate() {
            if index == 0 {
                set_string += &format!("{}", element);
            } else {
                set_string += &format!(", {}", element);
            }
        }
        set_string += "}";
        write!(f, "{}", set_string)
    }
}
