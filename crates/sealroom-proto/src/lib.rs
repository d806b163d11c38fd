//! Sealroom wire protocol.
//!
//! Envelope types and the JSON event framing used on the relay connection.
//! The relay only ever sees these types: ciphertext, IVs, wrapped keys and
//! routing names. Plaintext never crosses this boundary.
//!
//! # Events
//!
//! | event           | direction | payload          |
//! |-----------------|-----------|------------------|
//! | `join`          | outbound  | `{ username }`   |
//! | `room-envelope` | both      | [`RoomEnvelope`] |
//! | `dm-envelope`   | both      | [`DmEnvelope`]   |

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod errors;
pub mod frame;

pub use envelope::{DmEnvelope, Envelope, IV_LEN, MIN_CIPHERTEXT_LEN, RoomEnvelope};
pub use errors::{ProtocolError, Result};
pub use frame::{Frame, MAX_FRAME_SIZE};
