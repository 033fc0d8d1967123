use std::fmt;
use std::str::FromStr;

use ratatui::{layout::Rect, Frame};
use serde::Deserialize;

use crate::event::{Event, Request};

/// A self-contained region of the dashboard.
///
/// The composite root only ever talks to panels through this trait. A panel
/// mutates nothing but its own state, and every side effect it wants (start
/// a producer, read the next mailbox entry) is returned as a [`Request`].
pub trait Component: Send {
    fn name(&self) -> &'static str;

    /// Fixed fraction of the terminal width this panel occupies.
    fn share(&self) -> Share;

    fn init(&mut self) -> Vec<Request>;

    fn handle(&mut self, event: &Event) -> Vec<Request>;

    fn render(&mut self, frame: &mut Frame, area: Rect);
}

/// A fraction `num/den` of the terminal width, parsed from `"1/3"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Share {
    num: u16,
    den: u16,
}

impl Share {
    pub const FULL: Share = Share { num: 1, den: 1 };

    /// `den` of zero or `num > den` is clamped to the full width.
    pub const fn new(num: u16, den: u16) -> Self {
        if den == 0 || num > den {
            Share::FULL
        } else {
            Share { num, den }
        }
    }

    pub fn of(&self, total: u16) -> u16 {
        (u32::from(total) * u32::from(self.num) / u32::from(self.den)) as u16
    }

    pub fn fits_with(&self, other: Share) -> bool {
        let lhs = u32::from(self.num) * u32::from(other.den) + u32::from(other.num) * u32::from(self.den);
        lhs <= u32::from(self.den) * u32::from(other.den)
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Share {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (num, den) = input
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected a fraction like 1/3, got {input:?}"))?;
        let num: u16 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid numerator in {input:?}"))?;
        let den: u16 = den
            .trim()
            .parse()
            .map_err(|_| format!("invalid denominator in {input:?}"))?;
        if num == 0 || den == 0 || num > den {
            return Err(format!("share must be within (0, 1], got {input:?}"));
        }
        Ok(Share { num, den })
    }
}

impl TryFrom<String> for Share {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_of_rounds_down() {
        assert_eq!(Share::new(1, 3).of(100), 33);
        assert_eq!(Share::new(2, 3).of(100), 66);
        assert_eq!(Share::FULL.of(17), 17);
    }

    #[test]
    fn share_parses_fractions() {
        assert_eq!("1/3".parse::<Share>(), Ok(Share::new(1, 3)));
        assert_eq!(" 2 / 5 ".parse::<Share>(), Ok(Share::new(2, 5)));
        assert!("0/3".parse::<Share>().is_err());
        assert!("4/3".parse::<Share>().is_err());
        assert!("half".parse::<Share>().is_err());
    }

    #[test]
    fn shares_fit_when_sum_is_at_most_one() {
        assert!(Share::new(1, 3).fits_with(Share::new(2, 3)));
        assert!(!Share::new(1, 2).fits_with(Share::new(2, 3)));
    }
}
