use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DRAW_SIZE: usize = 5;
pub const MAX_NUMBER: u8 = 80;

/// One historical result: five distinct ascending numbers for a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub contest: i32,
    pub numbers: [u8; DRAW_SIZE],
}

impl Draw {
    pub fn new(contest: i32, mut numbers: [u8; DRAW_SIZE]) -> SimResult<Self> {
        numbers.sort_unstable();
        if numbers.iter().any(|n| *n == 0 || *n > MAX_NUMBER) {
            return Err(SimError::validation(format!(
                "contest {contest}: numbers must be within 1..={MAX_NUMBER}"
            )));
        }
        if numbers.windows(2).any(|w| w[0] == w[1]) {
            return Err(SimError::validation(format!(
                "contest {contest}: numbers must be distinct"
            )));
        }
        Ok(Self { contest, numbers })
    }

    /// Parses `contest,n1,n2,n3,n4,n5` (commas, semicolons or whitespace).
    pub fn parse_line(line: &str) -> SimResult<Self> {
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != DRAW_SIZE + 1 {
            return Err(SimError::validation(format!(
                "expected contest plus {DRAW_SIZE} numbers, got {:?}",
                line
            )));
        }
        let contest = fields[0]
            .parse::<i32>()
            .map_err(|_| SimError::validation(format!("bad contest number {:?}", fields[0])))?;
        let mut numbers = [0u8; DRAW_SIZE];
        for (slot, raw) in numbers.iter_mut().zip(&fields[1..]) {
            *slot = raw
                .parse::<u8>()
                .map_err(|_| SimError::validation(format!("bad number {:?} in {:?}", raw, line)))?;
        }
        Self::new(contest, numbers)
    }

    /// Parses a whole file, skipping blank lines, `#` comments and a non-numeric header.
    pub fn parse_many(text: &str) -> SimResult<Vec<Self>> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .map(Self::parse_line)
            .collect()
    }
}

/// Draws indexed by contest number.
#[derive(Debug, Clone, Default)]
pub struct DrawHistory {
    draws: BTreeMap<i32, Draw>,
}

impl DrawHistory {
    pub fn new(draws: impl IntoIterator<Item = Draw>) -> Self {
        Self {
            draws: draws.into_iter().map(|d| (d.contest, d)).collect(),
        }
    }

    pub fn get(&self, contest: i32) -> Option<&Draw> {
        self.draws.get(&contest)
    }

    /// The `size` most recent draws strictly before `contest`, oldest first.
    pub fn window(&self, contest: i32, size: usize) -> Vec<Draw> {
        let mut window: Vec<Draw> = self
            .draws
            .range(..contest)
            .rev()
            .take(size)
            .map(|(_, d)| d.clone())
            .collect();
        window.reverse();
        window
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(contests: std::ops::RangeInclusive<i32>) -> DrawHistory {
        DrawHistory::new(contests.map(|c| {
            let base = (c % 70) as u8 + 1;
            Draw::new(c, [base, base + 1, base + 2, base + 3, base + 4]).unwrap()
        }))
    }

    #[test]
    fn window_excludes_the_contest_itself() {
        let h = history(1..=20);
        let w = h.window(10, 5);
        let contests: Vec<i32> = w.iter().map(|d| d.contest).collect();
        assert_eq!(contests, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn short_history_yields_short_window() {
        let h = history(1..=3);
        assert_eq!(h.window(3, 10).len(), 2);
        assert!(h.window(1, 10).is_empty());
        assert!(h.window(50, 0).is_empty());
    }

    #[test]
    fn window_skips_gaps_by_index() {
        let h = DrawHistory::new(vec![
            Draw::new(1, [1, 2, 3, 4, 5]).unwrap(),
            Draw::new(4, [6, 7, 8, 9, 10]).unwrap(),
        ]);
        let w = h.window(6, 5);
        assert_eq!(w.len(), 2);
        assert_eq!(w[1].contest, 4);
    }

    #[test]
    fn parses_lines_and_sorts_numbers() {
        let d = Draw::parse_line("1200, 45, 3, 77, 12, 9").unwrap();
        assert_eq!(d.contest, 1200);
        assert_eq!(d.numbers, [3, 9, 12, 45, 77]);
    }

    #[test]
    fn rejects_out_of_range_and_duplicates() {
        assert!(Draw::parse_line("1,0,2,3,4,5").is_err());
        assert!(Draw::parse_line("1,81,2,3,4,5").is_err());
        assert!(Draw::parse_line("1,2,2,3,4,5").is_err());
        assert!(Draw::parse_line("1,2,3,4").is_err());
    }

    #[test]
    fn parse_many_skips_header_and_comments() {
        let text = "contest,a,b,c,d,e\n# comment\n\n1,1,2,3,4,5\n2;6;7;8;9;10\n";
        let draws = Draw::parse_many(text).unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].numbers, [6, 7, 8, 9, 10]);
    }
}
