//! Binary quantity codec.
//!
//! Each amount's quantity serializes as a one-byte tag followed by a
//! variable-length record:
//!
//! * `0` — no quantity (the zero amount);
//! * `1` — inline cell: `len: u16`, `len` magnitude bytes (big-endian,
//!   front-padded to 2-byte words, empty for a zero mantissa), a sign
//!   byte, and `precision: u16`;
//! * `2` — back-reference: `index: u32`, the 1-based number assigned to
//!   a previously written cell.
//!
//! Multi-byte scalars are little-endian. A writer assigns indices in
//! first-sight order, so amounts sharing one cell serialize the payload
//! once; a [`QuantityArena`] rehydrates the sharing on read.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use crate::amount::Amount;
use crate::quantity::Quantity;

const TAG_EMPTY: u8 = 0;
const TAG_INLINE: u8 = 1;
const TAG_BACKREF: u8 = 2;

/// Serializer for amount quantities with cell deduplication.
///
/// The writer remembers every cell it has emitted (holding a reference
/// so the cell cannot be dropped and its identity reused) and writes a
/// back-reference for each later sighting.
#[derive(Default)]
pub struct QuantityWriter {
    next_index: u32,
    seen: HashMap<usize, (u32, Arc<Quantity>)>,
}

impl QuantityWriter {
    /// Create a writer with an empty deduplication table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct cells written so far.
    pub fn cells_written(&self) -> usize {
        self.seen.len()
    }

    /// Write `amount`'s quantity record to `out`.
    pub fn write<W: Write>(&mut self, amount: &Amount, out: &mut W) -> io::Result<()> {
        let Some(cell) = amount.quantity.as_ref() else {
            return out.write_all(&[TAG_EMPTY]);
        };

        let key = Arc::as_ptr(cell) as usize;
        if let Some((index, _)) = self.seen.get(&key) {
            // Only a shared cell can come around twice.
            assert!(Arc::strong_count(cell) > 1, "back-reference to an unshared quantity cell");
            out.write_all(&[TAG_BACKREF])?;
            return out.write_all(&index.to_le_bytes());
        }

        self.next_index += 1;
        self.seen.insert(key, (self.next_index, Arc::clone(cell)));

        out.write_all(&[TAG_INLINE])?;
        let payload = export_magnitude(&cell.mantissa);
        let len = payload.len() as u16;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&payload)?;
        out.write_all(&[u8::from(cell.mantissa.sign() == Sign::Minus)])?;
        out.write_all(&cell.precision.to_le_bytes())
    }
}

/// Magnitude bytes in big-endian order, front-padded to an even length;
/// empty for zero.
fn export_magnitude(mantissa: &BigInt) -> Vec<u8> {
    if mantissa.is_zero() {
        return Vec::new();
    }
    let bytes = mantissa.magnitude().to_bytes_be();
    if bytes.len() % 2 == 1 {
        let mut padded = Vec::with_capacity(bytes.len() + 1);
        padded.push(0);
        padded.extend_from_slice(&bytes);
        padded
    } else {
        bytes
    }
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(input: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_cell<R: Read>(input: &mut R) -> io::Result<Quantity> {
    let len = read_u16(input)? as usize;
    let mut payload = vec![0u8; len];
    input.read_exact(&mut payload)?;
    let magnitude = BigUint::from_bytes_be(&payload);
    let negative = read_u8(input)? != 0;
    let precision = read_u16(input)?;
    let sign = if magnitude.is_zero() {
        Sign::NoSign
    } else if negative {
        Sign::Minus
    } else {
        Sign::Plus
    };
    Ok(Quantity::new(BigInt::from_biguint(sign, magnitude), precision))
}

/// Read one quantity record from a plain stream. Only inline records
/// appear in streams; a back-reference is meaningful only against an
/// arena and trips an assertion here.
pub fn read_quantity<R: Read>(input: &mut R) -> io::Result<Amount> {
    match read_u8(input)? {
        TAG_EMPTY => Ok(Amount::zero()),
        TAG_INLINE => Ok(Amount::from_parts(Some(Arc::new(read_cell(input)?)), None)),
        tag => panic!("quantity tag {tag} requires an arena reader"),
    }
}

/// Arena of quantity cells rehydrated from one serialized blob.
///
/// Inline records append a cell that the produced amount shares with
/// the arena; back-references resolve to earlier cells, so amounts that
/// shared a cell when written share one again after reading.
#[derive(Default)]
pub struct QuantityArena {
    cells: Vec<Arc<Quantity>>,
}

impl QuantityArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells rehydrated so far.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cells have been rehydrated.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read one quantity record, resolving back-references against the
    /// cells read before it.
    pub fn read<R: Read>(&mut self, input: &mut R) -> io::Result<Amount> {
        match read_u8(input)? {
            TAG_EMPTY => Ok(Amount::zero()),
            TAG_INLINE => {
                let cell = Arc::new(read_cell(input)?);
                self.cells.push(Arc::clone(&cell));
                Ok(Amount::from_parts(Some(cell), None))
            }
            TAG_BACKREF => {
                let index = read_u32(input)? as usize;
                assert!(
                    index >= 1 && index <= self.cells.len(),
                    "quantity back-reference {index} outside arena of {} cells",
                    self.cells.len()
                );
                Ok(Amount::from_parts(Some(Arc::clone(&self.cells[index - 1])), None))
            }
            tag => panic!("invalid quantity tag {tag}"),
        }
    }
}
