//! Resumable BER decoder for the OCTET STRING family
//!
//! # Usage Example
//!
//! ```rust
//! use asn1rt_core::Subvariant;
//! use asn1rt_octets::ber::{BerDecoder, DecodeStatus, TagMode};
//!
//! // Constructed, indefinite-length OCTET STRING delivered in two pieces
//! let mut decoder = BerDecoder::new(Subvariant::OctetString, TagMode::Declared, None);
//! let first = decoder.decode(&[0x24, 0x80, 0x04, 0x02, b'h']);
//! assert_eq!(first.status, DecodeStatus::WouldBlock);
//! assert_eq!(first.consumed, 5);
//!
//! let second = decoder.decode(&[b'i', 0x00, 0x00]);
//! assert_eq!(second.status, DecodeStatus::Complete);
//! assert_eq!(decoder.take_value().unwrap().as_bytes(), b"hi");
//! ```
//!
//! # Phases
//!
//! ```text
//! 0 CheckOuterTag ──constructed──> 1 FillExpectations <──> 2 DrainNested
//!        │                                 │
//!        └──primitive──> 3 DrainFlat       └──stack empty──> done
//! ```
//!
//! Nesting is walked with an explicit [`ExpectationStack`], never with
//! recursion, so hostile nesting depth cannot exhaust the call stack.

use crate::ber::scanner::{fetch_length, fetch_tag};
use crate::ber::stack::{EOC_LEN, ExpectationStack};
use crate::ber::types::{BerTag, TagMode};
use asn1rt_core::{Asn1Error, CodecConfig, DecodeError, DecodeResult, OctetString, Subvariant};

/// How a `decode()` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The value is complete; take it with [`BerDecoder::take_value`]
    Complete,
    /// Call again with at least one more byte at the same logical position
    WouldBlock,
    /// Terminal failure; the partial value has been discarded
    Failed(Asn1Error),
}

/// Status plus the number of input bytes the call advanced over
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct DecodeOutcome {
    pub status: DecodeStatus,
    pub consumed: usize,
}

impl DecodeOutcome {
    fn new(status: DecodeStatus, consumed: usize) -> Self {
        Self { status, consumed }
    }

    pub fn is_complete(&self) -> bool {
        self.status == DecodeStatus::Complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CheckOuterTag,
    FillExpectations,
    DrainNested,
    DrainFlat,
}

/// State that survives between `decode()` calls of one session
#[derive(Debug)]
struct DecodeContext {
    phase: Phase,
    stack: ExpectationStack,
    /// Content bytes left of a primitive outer encoding
    left: usize,
    /// BIT STRING unused-bits octets seen so far
    unused_octets: usize,
}

impl DecodeContext {
    fn new(config: &CodecConfig) -> Self {
        Self {
            phase: Phase::CheckOuterTag,
            stack: ExpectationStack::with_limits(*config),
            left: 0,
            unused_octets: 0,
        }
    }
}

/// Read position within the caller's window for one call
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    fn advance(&mut self, count: usize) {
        self.pos += count;
    }
}

/// Turn a short header scan into a failure when the enclosing TLV, not the
/// input, is what cut it short
fn within_budget<T>(scan: DecodeResult<T>, truncated_by_budget: bool) -> DecodeResult<T> {
    match scan {
        Err(DecodeError::WouldBlock) if truncated_by_budget => Err(Asn1Error::constraint(
            "TLV header overruns its enclosing TLV",
        )
        .into()),
        other => other,
    }
}

/// BER decoding session for one OCTET STRING family value
///
/// Feed input with [`decode`](Self::decode) as it arrives. Each call
/// returns how many bytes it consumed; unconsumed bytes must be offered
/// again, followed by new input, on the next call. Dropping the decoder
/// at any point releases the partial value and all stack frames.
#[derive(Debug)]
pub struct BerDecoder {
    subvariant: Subvariant,
    tag_mode: TagMode,
    tag: Option<BerTag>,
    config: CodecConfig,
    context: Option<DecodeContext>,
    value: Option<OctetString>,
    finished: Option<Result<(), Asn1Error>>,
}

impl BerDecoder {
    /// Create a decoding session
    ///
    /// # Arguments
    /// * `subvariant` - Family member being decoded
    /// * `tag_mode` - How the outer tag is checked
    /// * `tag` - The IMPLICIT or EXPLICIT tag; ignored for `TagMode::Declared`
    pub fn new(subvariant: Subvariant, tag_mode: TagMode, tag: Option<BerTag>) -> Self {
        Self::with_config(subvariant, tag_mode, tag, CodecConfig::default())
    }

    /// Create a decoding session with resource limits
    pub fn with_config(
        subvariant: Subvariant,
        tag_mode: TagMode,
        tag: Option<BerTag>,
        config: CodecConfig,
    ) -> Self {
        Self {
            subvariant,
            tag_mode,
            tag,
            config,
            context: None,
            value: None,
            finished: None,
        }
    }

    pub fn subvariant(&self) -> Subvariant {
        self.subvariant
    }

    /// Whether a terminal status has been reached
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Decoded bytes so far (partial until completion)
    pub fn value(&self) -> Option<&OctetString> {
        self.value.as_ref()
    }

    /// Take the completed value
    ///
    /// Returns `None` until the session has completed, and after a failure.
    pub fn take_value(&mut self) -> Option<OctetString> {
        match self.finished {
            Some(Ok(())) => self.value.take(),
            _ => None,
        }
    }

    /// Consume the session, returning the completed value
    pub fn into_value(mut self) -> Option<OctetString> {
        self.take_value()
    }

    /// Discard all progress and start a new session with the same settings
    pub fn reset(&mut self) {
        self.context = None;
        self.value = None;
        self.finished = None;
    }

    /// Decode as much of `input` as possible
    ///
    /// # Returns
    /// The status and the exact number of bytes this call advanced over.
    /// After a terminal status, further calls repeat it with `consumed == 0`.
    pub fn decode(&mut self, input: &[u8]) -> DecodeOutcome {
        match &self.finished {
            Some(Ok(())) => return DecodeOutcome::new(DecodeStatus::Complete, 0),
            Some(Err(err)) => return DecodeOutcome::new(DecodeStatus::Failed(err.clone()), 0),
            None => {}
        }

        let mut context = self
            .context
            .take()
            .unwrap_or_else(|| DecodeContext::new(&self.config));
        let mut value = self
            .value
            .take()
            .unwrap_or_else(|| OctetString::new(self.subvariant));
        let mut cursor = Cursor::new(input);

        let result = self.run(&mut context, &mut value, &mut cursor);
        let consumed = cursor.pos;

        match result {
            Ok(()) => {
                log::trace!(
                    "decoded {} of {} bytes as {}",
                    value.len(),
                    consumed,
                    self.subvariant
                );
                self.value = Some(value);
                self.finished = Some(Ok(()));
                DecodeOutcome::new(DecodeStatus::Complete, consumed)
            }
            Err(DecodeError::WouldBlock) => {
                log::trace!(
                    "{}: need more input after {} bytes ({:?})",
                    self.subvariant,
                    consumed,
                    context.phase
                );
                self.context = Some(context);
                self.value = Some(value);
                DecodeOutcome::new(DecodeStatus::WouldBlock, consumed)
            }
            Err(DecodeError::Fail(err)) => {
                log::debug!(
                    "{}: decoding failed in {:?} after {} bytes: {}",
                    self.subvariant,
                    context.phase,
                    consumed,
                    err
                );
                self.finished = Some(Err(err.clone()));
                DecodeOutcome::new(DecodeStatus::Failed(err), consumed)
            }
        }
    }

    fn run(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        cursor: &mut Cursor<'_>,
    ) -> DecodeResult<()> {
        loop {
            match context.phase {
                Phase::CheckOuterTag => self.check_outer_tag(context, value, cursor)?,
                Phase::FillExpectations => {
                    if self.fill_expectations(context, value, cursor)? {
                        break;
                    }
                }
                Phase::DrainNested => self.drain_nested(context, value, cursor)?,
                Phase::DrainFlat => {
                    self.drain_flat(context, value, cursor)?;
                    break;
                }
            }
        }
        self.finalize(value)
    }

    /// Tag the outermost TLV must carry, `None` when any tag is accepted
    fn outer_tag(&self) -> DecodeResult<Option<BerTag>> {
        match self.tag_mode {
            TagMode::Declared => Ok(BerTag::for_subvariant(self.subvariant)),
            TagMode::Implicit if self.subvariant == Subvariant::Any => Err(Asn1Error::unsupported(
                "an open type cannot be implicitly tagged",
            )
            .into()),
            TagMode::Implicit | TagMode::Explicit => self.tag.map(Some).ok_or_else(|| {
                Asn1Error::unsupported(format!("{:?} tagging requires a tag", self.tag_mode)).into()
            }),
        }
    }

    /// Phase 0: check the outer tag and pick the stack or stackless path
    fn check_outer_tag(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        cursor: &mut Cursor<'_>,
    ) -> DecodeResult<()> {
        let expected = self.outer_tag()?;
        let window = cursor.rest();

        let (tag, tag_len) = fetch_tag(window)?;
        if let Some(expected) = expected {
            if !tag.matches(&expected) {
                cursor.advance(tag_len);
                return Err(Asn1Error::malformed(format!(
                    "expected tag {:?} {}, found {:?} {}",
                    expected.class(),
                    expected.number(),
                    tag.class(),
                    tag.number()
                ))
                .into());
            }
        }

        let (length, len_len) = match fetch_length(&window[tag_len..], tag.is_constructed()) {
            Err(DecodeError::Fail(err)) => {
                cursor.advance(tag_len);
                return Err(err.into());
            }
            other => other?,
        };

        if tag.is_constructed() {
            // The header is scanned again as the root frame
            context.phase = Phase::FillExpectations;
            log::trace!("{}: constructed encoding, using expectation stack", self.subvariant);
            return Ok(());
        }

        if self.tag_mode == TagMode::Explicit {
            cursor.advance(tag_len);
            return Err(Asn1Error::malformed("EXPLICIT tag on a primitive encoding").into());
        }

        let header_len = tag_len + len_len;
        if self.subvariant == Subvariant::Any {
            self.append(value, &window[..header_len])?;
        }
        cursor.advance(header_len);
        context.left = length.definite().unwrap_or(0);
        context.phase = Phase::DrainFlat;
        Ok(())
    }

    /// Phase 1: open and close frames until a primitive leaf needs draining
    ///
    /// # Returns
    /// `true` once the outermost frame has been closed.
    fn fill_expectations(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        cursor: &mut Cursor<'_>,
    ) -> DecodeResult<bool> {
        let stack = &mut context.stack;
        let universal = BerTag::for_subvariant(self.subvariant);

        loop {
            if let Some(frame) = stack.active() {
                if frame.is_exhausted() {
                    if frame.explicit_wrapper && frame.children == 0 {
                        return Err(Asn1Error::malformed("EXPLICIT tag wraps no TLV").into());
                    }
                    log::trace!("close frame {:?} at depth {}, got {}", frame.tag, stack.depth(), frame.got);
                    stack.pop()?;
                    if stack.is_empty() {
                        return Ok(true);
                    }
                    continue;
                }
            }

            let rest = cursor.rest();
            let budget = stack.active().map_or(rest.len(), |frame| frame.window(rest.len()));
            let window = &rest[..budget];
            let truncated_by_budget = budget < rest.len();

            let (tag, tag_len) = within_budget(fetch_tag(window), truncated_by_budget)?;
            let (length, len_len) = within_budget(
                fetch_length(&window[tag_len..], tag.is_constructed()),
                truncated_by_budget,
            )?;
            let header_len = tag_len + len_len;

            if stack.is_end_of_content(window) {
                let in_wrapper = stack.active().is_some_and(|frame| frame.explicit_wrapper);
                if self.subvariant == Subvariant::Any && !in_wrapper {
                    self.append(value, &[0x00, 0x00])?;
                }
                stack.close_end_of_content()?;
                cursor.advance(EOC_LEN);
                continue;
            }

            let is_root = stack.is_empty();
            if let Some(parent) = stack.active() {
                if parent.explicit_wrapper && parent.children > 0 {
                    return Err(Asn1Error::malformed("EXPLICIT tag wraps more than one TLV").into());
                }
                if let Some(expected) = universal {
                    if !tag.matches(&expected) {
                        return Err(Asn1Error::malformed(format!(
                            "nested segment has tag {:?} {}, expected UNIVERSAL {}",
                            tag.class(),
                            tag.number(),
                            expected.number()
                        ))
                        .into());
                    }
                }
            }

            let wrapper = is_root && self.tag_mode == TagMode::Explicit;
            if self.subvariant == Subvariant::Any && !wrapper {
                self.append(value, &window[..header_len])?;
            }

            stack.push(tag, length, header_len)?;
            if let Some(frame) = stack.active_mut() {
                frame.explicit_wrapper = wrapper;
            }
            cursor.advance(header_len);
            log::trace!(
                "open frame {:?} at depth {}, length {:?}",
                tag,
                stack.depth(),
                length
            );

            if !tag.is_constructed() {
                context.phase = Phase::DrainNested;
                return Ok(false);
            }
        }
    }

    /// Phase 2: copy content of the primitive leaf on top of the stack
    fn drain_nested(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        cursor: &mut Cursor<'_>,
    ) -> DecodeResult<()> {
        let rest = cursor.rest();
        let (take, take_unused_octet) = match context.stack.active() {
            Some(frame) => (
                frame.window(rest.len()),
                self.subvariant.has_unused_bits_octet() && !frame.unused_octet_taken,
            ),
            None => return Err(Asn1Error::malformed("no open segment to drain").into()),
        };

        if take > 0 {
            let chunk = &rest[..take];
            if take_unused_octet {
                self.take_unused_octet(context, value, chunk[0])?;
                if let Some(frame) = context.stack.active_mut() {
                    frame.unused_octet_taken = true;
                }
                self.append(value, &chunk[1..])?;
            } else {
                self.append(value, chunk)?;
            }
            cursor.advance(take);
            context.stack.consume(take);
        }

        if context.stack.active().is_some_and(|frame| frame.left != Some(0)) {
            return Err(DecodeError::WouldBlock);
        }
        context.phase = Phase::FillExpectations;
        Ok(())
    }

    /// Phase 3: copy content of a primitive outer encoding
    fn drain_flat(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        cursor: &mut Cursor<'_>,
    ) -> DecodeResult<()> {
        let rest = cursor.rest();
        let take = context.left.min(rest.len());

        if take > 0 {
            let chunk = &rest[..take];
            if self.subvariant.has_unused_bits_octet() && context.unused_octets == 0 {
                self.take_unused_octet(context, value, chunk[0])?;
                self.append(value, &chunk[1..])?;
            } else {
                self.append(value, chunk)?;
            }
            cursor.advance(take);
            context.left -= take;
        }

        if context.left > 0 {
            return Err(DecodeError::WouldBlock);
        }
        Ok(())
    }

    /// Divert a BIT STRING segment's leading octet into `bits_unused`
    ///
    /// Only the final segment of a constructed BIT STRING may have unused
    /// bits (X.690 8.6.4).
    fn take_unused_octet(
        &self,
        context: &mut DecodeContext,
        value: &mut OctetString,
        octet: u8,
    ) -> DecodeResult<()> {
        if context.unused_octets > 0 && value.bits_unused() != 0 {
            return Err(Asn1Error::constraint(format!(
                "BIT STRING segment with {} unused bits is not the last one",
                value.bits_unused()
            ))
            .into());
        }
        value.put_unused_bits_octet(octet);
        context.unused_octets += 1;
        Ok(())
    }

    fn append(&self, value: &mut OctetString, bytes: &[u8]) -> DecodeResult<()> {
        let new_len = value.len().saturating_add(bytes.len());
        if !self.config.length_allowed(new_len) {
            return Err(Asn1Error::exhausted(format!(
                "value grows to {} bytes, limit is {:?}",
                new_len, self.config.max_length
            ))
            .into());
        }
        value.append(bytes)?;
        Ok(())
    }

    /// BIT STRING post-processing once all content is in
    fn finalize(&self, value: &mut OctetString) -> DecodeResult<()> {
        if self.subvariant.has_unused_bits_octet() {
            OctetString::check_bits_unused(value.len(), value.bits_unused())?;
            value.mask_unused_bits();
        }
        Ok(())
    }
}

/// Decode one complete value from a fully buffered input
///
/// # Returns
/// The value and the number of bytes its encoding occupied. Trailing bytes
/// after the encoding are left alone.
///
/// # Error Handling
/// `WouldBlock` if the input ends before the encoding does.
pub fn decode_ber(
    subvariant: Subvariant,
    tag_mode: TagMode,
    tag: Option<BerTag>,
    input: &[u8],
) -> DecodeResult<(OctetString, usize)> {
    let mut decoder = BerDecoder::new(subvariant, tag_mode, tag);
    let outcome = decoder.decode(input);
    match outcome.status {
        DecodeStatus::Complete => Ok((
            decoder
                .into_value()
                .unwrap_or_else(|| OctetString::new(subvariant)),
            outcome.consumed,
        )),
        DecodeStatus::WouldBlock => Err(DecodeError::WouldBlock),
        DecodeStatus::Failed(err) => Err(err.into()),
    }
}
