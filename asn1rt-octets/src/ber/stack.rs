//! Stack of nesting expectations for constructed BER encodings
//!
//! Each frame describes one open constructed (or leaf primitive) TLV: how
//! many content bytes it may still hold, how many bytes it has used so far,
//! and whether it is closed by an End-Of-Content marker instead of a count.
//!
//! Frames live in a `Vec` indexed by depth, so the parent of frame `i` is
//! frame `i - 1`. Popping only moves the top index down; the popped frame
//! stays allocated and is reused by the next sibling TLV at that depth.

use crate::ber::types::{BerLength, BerTag};
use asn1rt_core::{Asn1Error, Asn1Result, CodecConfig};

/// End-Of-Content marker length
pub const EOC_LEN: usize = 2;

/// One open TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Tag of the TLV
    pub tag: BerTag,
    /// Bytes the TLV may still hold, `None` when unbounded
    ///
    /// For an indefinite TLV inside a definite one this is the remaining
    /// budget of the parent, not an exact count.
    pub left: Option<usize>,
    /// Bytes used so far, header included
    pub got: usize,
    /// Closed by `00 00` rather than by `left` reaching zero
    pub want_eoc: bool,
    /// BIT STRING: the unused-bits octet of this chunk was taken
    pub unused_octet_taken: bool,
    /// Outer EXPLICIT tag wrapping the actual value
    pub explicit_wrapper: bool,
    /// Number of child TLVs pushed under this frame
    pub children: usize,
}

impl Frame {
    fn empty() -> Self {
        Self {
            tag: BerTag::universal(false, 0),
            left: Some(0),
            got: 0,
            want_eoc: false,
            unused_octet_taken: false,
            explicit_wrapper: false,
            children: 0,
        }
    }

    /// No content left and no End-Of-Content awaited
    pub fn is_exhausted(&self) -> bool {
        !self.want_eoc && self.left == Some(0)
    }

    /// Content bytes this frame may accept from a window of `available` bytes
    pub fn window(&self, available: usize) -> usize {
        self.left.map_or(available, |left| left.min(available))
    }
}

/// Explicit, reusable stack of [`Frame`]s
#[derive(Debug, Clone, Default)]
pub struct ExpectationStack {
    frames: Vec<Frame>,
    /// Index of the active frame
    top: Option<usize>,
    limits: CodecConfig,
}

impl ExpectationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stack that refuses to nest deeper than `limits.max_depth`
    pub fn with_limits(limits: CodecConfig) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Number of open frames
    pub fn depth(&self) -> usize {
        self.top.map_or(0, |top| top + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Frames allocated so far, open or recycled
    pub fn allocated(&self) -> usize {
        self.frames.len()
    }

    pub fn active(&self) -> Option<&Frame> {
        self.top.map(|top| &self.frames[top])
    }

    pub fn active_mut(&mut self) -> Option<&mut Frame> {
        self.top.map(move |top| &mut self.frames[top])
    }

    /// Open a frame for a child TLV of the active frame
    ///
    /// # Arguments
    /// * `tag` - Tag of the child
    /// * `length` - Its declared length
    /// * `header_len` - Size of its tag and length fields
    ///
    /// # Returns
    /// The depth index of the new frame.
    ///
    /// # Error Handling
    /// - `ConstraintViolation` if header plus content exceed what the
    ///   parent has left
    /// - `ResourceExhausted` if the size sum overflows or the depth limit
    ///   is reached
    pub fn push(&mut self, tag: BerTag, length: BerLength, header_len: usize) -> Asn1Result<usize> {
        let index = self.depth();
        if !self.limits.depth_allowed(index + 1) {
            return Err(Asn1Error::exhausted(format!(
                "nesting deeper than {} levels",
                index
            )));
        }

        let total = header_len
            .checked_add(length.definite().unwrap_or(0))
            .ok_or_else(|| Asn1Error::exhausted("TLV size overflows usize"))?;

        let parent_left = match self.top {
            Some(top) => {
                let parent = &mut self.frames[top];
                parent.children += 1;
                parent.left
            }
            None => None,
        };

        let left = match (parent_left, length.definite()) {
            (Some(parent_left), _) if parent_left < total => {
                return Err(Asn1Error::constraint(format!(
                    "TLV of {} bytes exceeds the {} bytes left in its parent",
                    total, parent_left
                )));
            }
            (_, Some(length)) => Some(length),
            (Some(parent_left), None) => Some(parent_left - header_len),
            (None, None) => None,
        };

        if index == self.frames.len() {
            self.frames.push(Frame::empty());
        }
        let frame = &mut self.frames[index];
        *frame = Frame {
            tag,
            left,
            got: header_len,
            want_eoc: length.is_indefinite(),
            ..Frame::empty()
        };
        self.top = Some(index);
        Ok(index)
    }

    /// Close the active frame and charge its size to the parent
    ///
    /// # Error Handling
    /// Returns `ConstraintViolation` if the parent has fewer bytes left than
    /// the child used (inconsistent nested lengths).
    pub fn pop(&mut self) -> Asn1Result<()> {
        let Some(top) = self.top else {
            return Ok(());
        };
        let got = self.frames[top].got;

        if top == 0 {
            self.top = None;
            return Ok(());
        }

        let parent = &mut self.frames[top - 1];
        if let Some(left) = parent.left {
            parent.left = Some(left.checked_sub(got).ok_or_else(|| {
                Asn1Error::constraint(format!(
                    "nested TLV used {} bytes, its parent had {} left",
                    got, left
                ))
            })?);
        }
        parent.got = parent
            .got
            .checked_add(got)
            .ok_or_else(|| Asn1Error::exhausted("consumed byte count overflows usize"))?;
        self.top = Some(top - 1);
        Ok(())
    }

    /// Check for an End-Of-Content marker awaited by the active frame
    pub fn is_end_of_content(&self, window: &[u8]) -> bool {
        self.active().is_some_and(|frame| frame.want_eoc) && window.starts_with(&[0x00, 0x00])
    }

    /// Consume an End-Of-Content marker, closing the active frame
    pub fn close_end_of_content(&mut self) -> Asn1Result<()> {
        let frame = self
            .active_mut()
            .ok_or_else(|| Asn1Error::malformed("End-Of-Content outside a constructed encoding"))?;
        if let Some(left) = frame.left {
            if left < EOC_LEN {
                return Err(Asn1Error::constraint(
                    "End-Of-Content marker overruns the enclosing TLV",
                ));
            }
        }
        frame.got += EOC_LEN;
        frame.left = Some(0);
        frame.want_eoc = false;
        Ok(())
    }

    /// Account for `count` content bytes of the active (leaf) frame
    pub fn consume(&mut self, count: usize) {
        if let Some(frame) = self.active_mut() {
            frame.got += count;
            if let Some(left) = frame.left.as_mut() {
                *left -= count;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constructed() -> BerTag {
        BerTag::universal(true, 4)
    }

    fn primitive() -> BerTag {
        BerTag::universal(false, 4)
    }

    #[test]
    fn test_push_pop_propagates() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::new(10), 2).unwrap();
        stack.push(primitive(), BerLength::new(3), 2).unwrap();
        assert_eq!(stack.depth(), 2);

        stack.consume(3);
        assert!(stack.active().unwrap().is_exhausted());
        stack.pop().unwrap();

        let root = stack.active().unwrap();
        assert_eq!(root.left, Some(5));
        assert_eq!(root.got, 2 + 5);
        assert_eq!(root.children, 1);
    }

    #[test]
    fn test_child_exceeding_parent_is_rejected() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::new(4), 2).unwrap();
        let err = stack.push(primitive(), BerLength::new(3), 2).unwrap_err();
        assert!(matches!(err, Asn1Error::ConstraintViolation(_)));
    }

    #[test]
    fn test_indefinite_child_inherits_budget() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::new(20), 2).unwrap();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        let frame = stack.active().unwrap();
        assert_eq!(frame.left, Some(18));
        assert!(frame.want_eoc);
    }

    #[test]
    fn test_indefinite_root_is_unbounded() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        assert_eq!(stack.active().unwrap().left, None);
        assert_eq!(stack.active().unwrap().window(100), 100);

        assert!(stack.is_end_of_content(&[0, 0, 4]));
        assert!(!stack.is_end_of_content(&[0, 1]));
        stack.close_end_of_content().unwrap();
        assert!(stack.active().unwrap().is_exhausted());
        assert_eq!(stack.active().unwrap().got, 4);
        stack.pop().unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_eoc_not_awaited_by_definite_frame() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::new(2), 2).unwrap();
        assert!(!stack.is_end_of_content(&[0, 0]));
    }

    #[test]
    fn test_frames_are_recycled_across_siblings() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        for _ in 0..5 {
            stack.push(primitive(), BerLength::new(1), 2).unwrap();
            stack.consume(1);
            stack.pop().unwrap();
        }
        assert_eq!(stack.allocated(), 2);
        assert_eq!(stack.active().unwrap().got, 2 + 5 * 3);
        assert_eq!(stack.active().unwrap().children, 5);
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = ExpectationStack::with_limits(CodecConfig::default().with_max_depth(2));
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        assert_eq!(stack.depth(), 2);
        let err = stack.push(constructed(), BerLength::Indefinite, 2).unwrap_err();
        assert!(matches!(err, Asn1Error::ResourceExhausted(_)));

        // A popped level can be reopened
        stack.pop().unwrap();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_pop_detects_inconsistent_lengths() {
        let mut stack = ExpectationStack::new();
        stack.push(constructed(), BerLength::new(6), 2).unwrap();
        stack.push(constructed(), BerLength::Indefinite, 2).unwrap();
        // An indefinite child may use its whole budget, then its EOC pushes it over
        stack.consume(4);
        assert!(matches!(
            stack.close_end_of_content(),
            Err(Asn1Error::ConstraintViolation(_))
        ));
    }
}
