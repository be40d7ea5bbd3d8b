//! Allocation-site tags, subsystems, and traced buffer operations.
//!
//! Every buffer records which call site asked for it (`AllocatorTag`) so the
//! usage report can attribute outstanding memory. Subsystem/operation pairs
//! feed the optional per-buffer usage trace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call-site origin of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorTag {
    None,
    External,
    Other,
    PeerTransportRead,
    PeerTransportLength,
    CacheRead,
    CacheWrite,
    DiskRead,
    DiskZero,
    DiskCheck,
    PieceBlock,
    ProxyRelay,
    Message,
    MessageHandshake,
    MessageHave,
    MessagePiece,
    MessageRequest,
    MessageKeepAlive,
    MessageHeader,
    MessagePayload,
    File,
    NetCrypt,
}

impl AllocatorTag {
    /// Short code used in usage reports.
    pub const fn code(self) -> &'static str {
        match self {
            AllocatorTag::None => "NONE",
            AllocatorTag::External => "EXTN",
            AllocatorTag::Other => "OTHE",
            AllocatorTag::PeerTransportRead => "PTRE",
            AllocatorTag::PeerTransportLength => "PTLE",
            AllocatorTag::CacheRead => "CARE",
            AllocatorTag::CacheWrite => "CAWR",
            AllocatorTag::DiskRead => "DMRE",
            AllocatorTag::DiskZero => "DMZE",
            AllocatorTag::DiskCheck => "DMCH",
            AllocatorTag::PieceBlock => "BTPI",
            AllocatorTag::ProxyRelay => "PRRE",
            AllocatorTag::Message => "MSG",
            AllocatorTag::MessageHandshake => "MSHA",
            AllocatorTag::MessageHave => "MSHV",
            AllocatorTag::MessagePiece => "MSPI",
            AllocatorTag::MessageRequest => "MSRQ",
            AllocatorTag::MessageKeepAlive => "MSKA",
            AllocatorTag::MessageHeader => "MSHE",
            AllocatorTag::MessagePayload => "MSPA",
            AllocatorTag::File => "FILE",
            AllocatorTag::NetCrypt => "NCRY",
        }
    }

    /// Subsystem a freshly acquired buffer is attributed to.
    pub const fn subsystem(self) -> Subsystem {
        match self {
            AllocatorTag::None => Subsystem::None,
            AllocatorTag::External => Subsystem::External,
            AllocatorTag::Other => Subsystem::Other,
            AllocatorTag::PeerTransportRead
            | AllocatorTag::PeerTransportLength
            | AllocatorTag::NetCrypt => Subsystem::Net,
            AllocatorTag::CacheRead | AllocatorTag::CacheWrite => Subsystem::Cache,
            AllocatorTag::DiskRead | AllocatorTag::DiskCheck => Subsystem::DiskRead,
            AllocatorTag::DiskZero => Subsystem::DiskWrite,
            AllocatorTag::PieceBlock => Subsystem::BitTorrent,
            AllocatorTag::ProxyRelay => Subsystem::Proxy,
            AllocatorTag::Message
            | AllocatorTag::MessageHandshake
            | AllocatorTag::MessageHave
            | AllocatorTag::MessagePiece
            | AllocatorTag::MessageRequest
            | AllocatorTag::MessageKeepAlive
            | AllocatorTag::MessageHeader
            | AllocatorTag::MessagePayload => Subsystem::Message,
            AllocatorTag::File => Subsystem::File,
        }
    }
}

impl fmt::Display for AllocatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Layer currently operating on a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    None,
    External,
    Other,
    Cache,
    File,
    Net,
    BitTorrent,
    DiskRead,
    DiskWrite,
    Peer,
    Proxy,
    Message,
}

impl Subsystem {
    pub const fn code(self) -> &'static str {
        match self {
            Subsystem::None => "NONE",
            Subsystem::External => "EXTN",
            Subsystem::Other => "OTHE",
            Subsystem::Cache => "CACH",
            Subsystem::File => "FILE",
            Subsystem::Net => "NET",
            Subsystem::BitTorrent => "BT",
            Subsystem::DiskRead => "DR",
            Subsystem::DiskWrite => "DW",
            Subsystem::Peer => "PEER",
            Subsystem::Proxy => "PROX",
            Subsystem::Message => "MSG",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Buffer operation recorded by the usage trace and named in bounds errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SetLimit,
    SetPosition,
    Clear,
    Flip,
    Rewind,
    PutU8,
    PutU16,
    PutU32,
    PutBytes,
    PutBuffer,
    PutAt,
    GetU8,
    GetU16,
    GetU32,
    GetBytes,
    GetAt,
    ReadStream,
    WriteStream,
    Share,
    Retag,
    Handover,
    Release,
}

impl Operation {
    pub const fn code(self) -> &'static str {
        match self {
            Operation::SetLimit => "lim",
            Operation::SetPosition => "pos",
            Operation::Clear => "clr",
            Operation::Flip => "flp",
            Operation::Rewind => "rew",
            Operation::PutU8 => "put1",
            Operation::PutU16 => "put2",
            Operation::PutU32 => "put4",
            Operation::PutBytes => "putb",
            Operation::PutBuffer => "putd",
            Operation::PutAt => "puta",
            Operation::GetU8 => "get1",
            Operation::GetU16 => "get2",
            Operation::GetU32 => "get4",
            Operation::GetBytes => "getb",
            Operation::GetAt => "geta",
            Operation::ReadStream => "read",
            Operation::WriteStream => "writ",
            Operation::Share => "shr",
            Operation::Retag => "tag",
            Operation::Handover => "hand",
            Operation::Release => "rel",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
