//! Control Segment layout.
//!
//! Two little-endian `u64` fields, each written by exactly one side:
//!
//! ```text
//! offset 0  write_offset  (Writer)
//! offset 8  read_offset   (Reader)
//! ```

use std::fmt;

use serde_derive::{Deserialize, Serialize};

pub const WRITE_OFFSET_AT: usize = 0;
pub const READ_OFFSET_AT: usize = 8;
pub const CONTROL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Writer,
    Reader,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Writer => Role::Reader,
            Role::Reader => Role::Writer,
        }
    }

    /// Byte offset of the pointer this role owns.
    #[inline]
    fn field_at(self) -> usize {
        match self {
            Role::Writer => WRITE_OFFSET_AT,
            Role::Reader => READ_OFFSET_AT,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointers {
    pub write_offset: u64,
    pub read_offset: u64,
}

/// View over the Control Segment bound to one endpoint role.
///
/// Only the field owned by `role` can be published; the peer's field is read-only here.
pub(crate) struct ControlBlock<'a> {
    bytes: &'a mut [u8],
    role: Role,
}

impl<'a> ControlBlock<'a> {
    pub fn new(bytes: &'a mut [u8], role: Role) -> ControlBlock<'a> {
        assert!(bytes.len() >= CONTROL_SIZE);
        ControlBlock { bytes, role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    fn load_field(&self, owner: Role) -> u64 {
        let at = owner.field_at();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[at..at + 8]);
        u64::from_le_bytes(buf)
    }

    /// The last value this endpoint published.
    pub fn own(&self) -> u64 {
        self.load_field(self.role)
    }

    /// The last value the other endpoint published.
    pub fn peer(&self) -> u64 {
        self.load_field(self.role.peer())
    }

    pub fn publish(&mut self, value: u64) {
        let at = self.role.field_at();
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn snapshot(&self) -> Pointers {
        Pointers {
            write_offset: self.load_field(Role::Writer),
            read_offset: self.load_field(Role::Reader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_publishes_at_offset_zero() {
        let mut bytes = vec![0u8; CONTROL_SIZE];
        ControlBlock::new(&mut bytes, Role::Writer).publish(0x0102_0304_0506_0708);
        assert_eq!(&bytes[0..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&bytes[8..16], &[0; 8]);
    }

    #[test]
    fn reader_publishes_at_offset_eight() {
        let mut bytes = vec![0u8; CONTROL_SIZE];
        ControlBlock::new(&mut bytes, Role::Reader).publish(42);
        assert_eq!(&bytes[0..8], &[0; 8]);
        assert_eq!(&bytes[8..16], &42u64.to_le_bytes());
    }

    #[test]
    fn peer_reads_the_other_field() {
        let mut bytes = vec![0u8; CONTROL_SIZE];
        ControlBlock::new(&mut bytes, Role::Writer).publish(100);
        ControlBlock::new(&mut bytes, Role::Reader).publish(60);

        let reader = ControlBlock::new(&mut bytes, Role::Reader);
        assert_eq!(reader.own(), 60);
        assert_eq!(reader.peer(), 100);
        assert_eq!(
            reader.snapshot(),
            Pointers {
                write_offset: 100,
                read_offset: 60
            }
        );
    }

    #[test]
    fn role_peer_is_symmetric() {
        assert_eq!(Role::Writer.peer(), Role::Reader);
        assert_eq!(Role::Reader.peer().peer(), Role::Reader);
    }
}
