use std::fmt;

use crate::error::{Error, Result};

/// Note value that one clock tick stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdivision {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl Subdivision {
    /// Parse the note value as written under a time signature (1, 2, 4, ...)
    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Subdivision::Whole),
            2 => Ok(Subdivision::Half),
            4 => Ok(Subdivision::Quarter),
            8 => Ok(Subdivision::Eighth),
            16 => Ok(Subdivision::Sixteenth),
            32 => Ok(Subdivision::ThirtySecond),
            other => Err(Error::InvalidSubdivision(other)),
        }
    }

    pub fn value(self) -> u32 {
        match self {
            Subdivision::Whole => 1,
            Subdivision::Half => 2,
            Subdivision::Quarter => 4,
            Subdivision::Eighth => 8,
            Subdivision::Sixteenth => 16,
            Subdivision::ThirtySecond => 32,
        }
    }

    /// Next shorter note value, if any
    pub fn faster(self) -> Option<Self> {
        Self::from_value(self.value() * 2).ok()
    }

    /// Next longer note value, if any
    pub fn slower(self) -> Option<Self> {
        match self {
            Subdivision::Whole => None,
            other => Self::from_value(other.value() / 2).ok(),
        }
    }

    /// How many ticks of this note value fit in one quarter note
    pub fn rate(self) -> f64 {
        match self {
            Subdivision::Whole => 0.25,
            Subdivision::Half => 0.5,
            Subdivision::Quarter => 1.0,
            Subdivision::Eighth => 2.0,
            Subdivision::Sixteenth => 4.0,
            Subdivision::ThirtySecond => 8.0,
        }
    }
}

/// One bar of the sequence: `beats_per_bar` ticks of `subdivision`,
/// played `repeat_count` times before the next bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSpec {
    pub beats_per_bar: u32,
    pub subdivision: Subdivision,
    pub repeat_count: u32,
}

impl BarSpec {
    pub fn new(beats_per_bar: u32, subdivision: Subdivision, repeat_count: u32) -> Result<Self> {
        if beats_per_bar == 0 {
            return Err(Error::InvalidBeats);
        }
        if repeat_count == 0 {
            return Err(Error::InvalidRepeat);
        }
        Ok(Self {
            beats_per_bar,
            subdivision,
            repeat_count,
        })
    }

    /// Ticks spent in this bar across all of its repeats
    pub fn total_beats(&self) -> u64 {
        u64::from(self.beats_per_bar) * u64::from(self.repeat_count)
    }
}

impl Default for BarSpec {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            subdivision: Subdivision::Quarter,
            repeat_count: 1,
        }
    }
}

impl fmt::Display for BarSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.subdivision.value())?;
        if self.repeat_count > 1 {
            write!(f, "*{}", self.repeat_count)?;
        }
        Ok(())
    }
}

/// Ordered bar list; never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    bars: Vec<BarSpec>,
}

impl Sequence {
    pub fn new(bars: Vec<BarSpec>) -> Result<Self> {
        if bars.is_empty() {
            return Err(Error::EmptySequence);
        }
        let mut seq = Self { bars };
        seq.normalize();
        Ok(seq)
    }

    pub fn single(bar: BarSpec) -> Self {
        let mut seq = Self { bars: vec![bar] };
        seq.normalize();
        seq
    }

    pub fn bars(&self) -> &[BarSpec] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed sequence
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BarSpec> {
        self.bars.get(index)
    }

    pub fn first(&self) -> &BarSpec {
        &self.bars[0]
    }

    /// Copy the bar at `index` onto the end of the sequence
    pub fn duplicate(&mut self, index: usize) -> Result<()> {
        let bar = *self.checked(index)?;
        self.bars.push(bar);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<BarSpec> {
        self.checked(index)?;
        if self.bars.len() == 1 {
            return Err(Error::LastBar);
        }
        let removed = self.bars.remove(index);
        self.normalize();
        Ok(removed)
    }

    pub fn replace(&mut self, index: usize, bar: BarSpec) -> Result<()> {
        *self.checked_mut(index)? = bar;
        self.normalize();
        Ok(())
    }

    fn checked(&self, index: usize) -> Result<&BarSpec> {
        let len = self.bars.len();
        self.bars.get(index).ok_or(Error::BarIndex { index, len })
    }

    fn checked_mut(&mut self, index: usize) -> Result<&mut BarSpec> {
        let len = self.bars.len();
        self.bars.get_mut(index).ok_or(Error::BarIndex { index, len })
    }

    // A lone bar never hands over to another, so its repeat count is moot.
    fn normalize(&mut self) {
        if let [only] = self.bars.as_mut_slice() {
            only.repeat_count = 1;
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::single(BarSpec::default())
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, bar) in self.bars.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", bar)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bar(beats: u32, sub: u32, repeat: u32) -> BarSpec {
        BarSpec::new(beats, Subdivision::from_value(sub).unwrap(), repeat).unwrap()
    }

    #[test]
    fn test_subdivision_values() {
        for value in [1, 2, 4, 8, 16, 32] {
            assert_eq!(Subdivision::from_value(value).unwrap().value(), value);
        }
        assert_eq!(Subdivision::from_value(3), Err(Error::InvalidSubdivision(3)));
        assert_eq!(Subdivision::from_value(0), Err(Error::InvalidSubdivision(0)));
    }

    #[test]
    fn test_faster_and_slower() {
        assert_eq!(Subdivision::Quarter.faster(), Some(Subdivision::Eighth));
        assert_eq!(Subdivision::ThirtySecond.faster(), None);
        assert_eq!(Subdivision::Half.slower(), Some(Subdivision::Whole));
        assert_eq!(Subdivision::Whole.slower(), None);
    }

    #[test]
    fn test_replace_bar() {
        let mut seq = Sequence::new(vec![bar(3, 4, 2), bar(5, 8, 1)]).unwrap();
        seq.replace(1, bar(6, 16, 2)).unwrap();
        assert_eq!(seq.bars().to_vec(), vec![bar(3, 4, 2), bar(6, 16, 2)]);
        assert_eq!(seq.replace(2, bar(1, 1, 1)), Err(Error::BarIndex { index: 2, len: 2 }));
    }

    #[test]
    fn test_bar_rejects_zero_counts() {
        assert_eq!(BarSpec::new(0, Subdivision::Quarter, 1), Err(Error::InvalidBeats));
        assert_eq!(BarSpec::new(4, Subdivision::Quarter, 0), Err(Error::InvalidRepeat));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        assert_eq!(Sequence::new(Vec::new()), Err(Error::EmptySequence));
    }

    #[test]
    fn test_duplicate_appends_copy() {
        let mut seq = Sequence::new(vec![bar(3, 4, 2), bar(5, 8, 1)]).unwrap();
        seq.duplicate(0).unwrap();
        assert_eq!(seq.bars().to_vec(), vec![bar(3, 4, 2), bar(5, 8, 1), bar(3, 4, 2)]);
        assert_eq!(seq.duplicate(7), Err(Error::BarIndex { index: 7, len: 3 }));
    }

    #[test]
    fn test_last_bar_cannot_be_removed() {
        let mut seq = Sequence::new(vec![bar(3, 4, 2), bar(5, 8, 3)]).unwrap();
        assert_eq!(seq.remove(0).unwrap(), bar(3, 4, 2));
        assert_eq!(seq.remove(0), Err(Error::LastBar));
        assert_eq!(seq.len(), 1);
        assert!(!seq.is_empty());
    }

    #[test]
    fn test_lone_bar_plays_once() {
        let mut seq = Sequence::new(vec![bar(3, 4, 2), bar(5, 8, 3)]).unwrap();
        seq.remove(0).unwrap();
        assert_eq!(seq.first().repeat_count, 1);

        let seq = Sequence::single(bar(7, 16, 4));
        assert_eq!(seq.first().repeat_count, 1);
    }

    #[test]
    fn test_display() {
        let seq = Sequence::new(vec![bar(4, 4, 1), bar(7, 8, 3)]).unwrap();
        assert_eq!(seq.to_string().as_str(), "4/4 7/8*3");
    }
}
