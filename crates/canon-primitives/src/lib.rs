//! # canon-primitives
//!
//! Fixed-width hash and address types shared by every Canon crate.
//!
//! `H256` doubles as block hash, transaction hash, state root and storage
//! word. `U256` is re-exported from `primitive-types` and is used for
//! balances, difficulty and total difficulty.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::Address;
pub use error::PrimitiveError;
pub use hash::H256;

pub use primitive_types::U256;

/// Block number type
pub type BlockNumber = u64;

/// Transaction nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;

/// Strip an optional `0x` prefix and decode hex into a fixed-size array.
pub(crate) fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], PrimitiveError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| PrimitiveError::InvalidHex(e.to_string()))?;
    copy_fixed(&bytes)
}

pub(crate) fn copy_fixed<const N: usize>(slice: &[u8]) -> Result<[u8; N], PrimitiveError> {
    if slice.len() != N {
        return Err(PrimitiveError::InvalidLength {
            expected: N,
            got: slice.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}
