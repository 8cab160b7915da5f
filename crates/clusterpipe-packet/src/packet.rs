use bytes::{Buf, BufMut, BytesMut};

use crate::error::PacketError;

/// Default packet payload capacity: fits a typical Ethernet MTU with room for
/// transport headers.
pub const DEFAULT_PACKET_CAPACITY: usize = 1400;

/// Smallest usable capacity: one write status (two 32-bit integers).
pub const MIN_PACKET_CAPACITY: usize = 8;

/// A fixed-capacity broadcast unit.
///
/// Packets are move-only: exactly one side owns a packet at any time, and
/// handing it to [`Multiplexer::send_packet`](crate::Multiplexer::send_packet)
/// gives up ownership.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    data: BytesMut,
    capacity: usize,
}

impl Packet {
    /// Create an empty packet holding at most `capacity` payload bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a packet carrying a copy of `payload`.
    pub fn from_payload(payload: &[u8], capacity: usize) -> Result<Self, PacketError> {
        let mut packet = Self::with_capacity(capacity);
        packet.writer().write_bytes(payload)?;
        Ok(packet)
    }

    /// Maximum payload size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current payload size.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The payload written so far.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Append values to the payload.
    pub fn writer(&mut self) -> PacketWriter<'_> {
        PacketWriter { packet: self }
    }

    /// Decode values from the start of the payload.
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader { data: &self.data }
    }

    /// Copy for fan-out to several receivers inside a multiplexer.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
        }
    }
}

/// Appending cursor over a packet's payload. Integers are little-endian.
pub struct PacketWriter<'a> {
    packet: &'a mut Packet,
}

impl PacketWriter<'_> {
    /// Bytes still available in the packet.
    pub fn remaining(&self) -> usize {
        self.packet.capacity - self.packet.data.len()
    }

    fn reserve(&mut self, needed: usize) -> Result<(), PacketError> {
        let available = self.remaining();
        if needed > available {
            return Err(PacketError::Overflow { needed, available });
        }
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), PacketError> {
        self.reserve(4)?;
        self.packet.data.put_i32_le(value);
        Ok(())
    }

    /// Append raw bytes without a length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.reserve(bytes.len())?;
        self.packet.data.put_slice(bytes);
        Ok(())
    }

    /// Append a string as a 32-bit length followed by its UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<(), PacketError> {
        let len = i32::try_from(value.len()).map_err(|_| PacketError::Overflow {
            needed: value.len(),
            available: self.remaining(),
        })?;
        self.reserve(4 + value.len())?;
        self.packet.data.put_i32_le(len);
        self.packet.data.put_slice(value.as_bytes());
        Ok(())
    }
}

/// Consuming cursor over a packet's payload. Integers are little-endian.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn require(&self, needed: usize) -> Result<(), PacketError> {
        if needed > self.data.len() {
            return Err(PacketError::Underflow {
                needed,
                available: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        self.require(4)?;
        Ok(self.data.get_i32_le())
    }

    /// Consume exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.require(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Consume a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, PacketError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| PacketError::InvalidLength(len))?;
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_pair_layout() {
        let mut packet = Packet::with_capacity(MIN_PACKET_CAPACITY);
        let mut writer = packet.writer();
        writer.write_i32(2).unwrap();
        writer.write_i32(17).unwrap();
        assert_eq!(writer.remaining(), 0);

        assert_eq!(packet.payload(), &[2, 0, 0, 0, 17, 0, 0, 0]);

        let mut reader = packet.reader();
        assert_eq!(reader.read_i32().unwrap(), 2);
        assert_eq!(reader.read_i32().unwrap(), 17);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut packet = Packet::with_capacity(64);
        packet.writer().write_string("node-03").unwrap();

        assert_eq!(&packet.payload()[..4], &7i32.to_le_bytes());
        assert_eq!(&packet.payload()[4..], b"node-03");
        assert_eq!(packet.reader().read_string().unwrap(), "node-03");
    }

    #[test]
    fn test_overflow_is_rejected_without_partial_write() {
        let mut packet = Packet::with_capacity(6);
        let err = packet.writer().write_string("abc").unwrap_err();
        assert_eq!(
            err,
            PacketError::Overflow {
                needed: 7,
                available: 6
            }
        );
        assert!(packet.is_empty());

        packet.writer().write_i32(1).unwrap();
        assert!(matches!(
            packet.writer().write_i32(1),
            Err(PacketError::Overflow { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_underflow_reports_shortfall() {
        let packet = Packet::from_payload(&[1, 2], 16).unwrap();
        let err = packet.reader().read_i32().unwrap_err();
        assert_eq!(
            err,
            PacketError::Underflow {
                needed: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_negative_string_length_is_invalid() {
        let mut packet = Packet::with_capacity(16);
        packet.writer().write_i32(-5).unwrap();
        assert_eq!(
            packet.reader().read_string().unwrap_err(),
            PacketError::InvalidLength(-5)
        );
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let mut packet = Packet::with_capacity(16);
        let mut writer = packet.writer();
        writer.write_i32(2).unwrap();
        writer.write_bytes(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            packet.reader().read_string(),
            Err(PacketError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_read_bytes_borrows_from_payload() {
        let packet = Packet::from_payload(b"PONGtail", 16).unwrap();
        let mut reader = packet.reader();
        assert_eq!(reader.read_bytes(4).unwrap(), b"PONG");
        assert_eq!(reader.read_bytes(4).unwrap(), b"tail");
        assert!(reader.read_bytes(1).is_err());
    }
}
