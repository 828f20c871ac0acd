use crate::DeserializeError;
use std::convert::TryFrom;

/// The error taxonomy shared by the master, chunk servers, and clients
/// (§4.15). The discriminant is the `u8` that travels on the wire in every
/// `*_STATUS` message; the `Display` string is the fixed human-readable
/// message associated with each code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    Eperm = 1,
    Enotdir = 2,
    Enoent = 3,
    Eacces = 4,
    Eexist = 5,
    Einval = 6,
    Enotempty = 7,
    ChunkLost = 8,
    OutOfMemory = 9,
    IndexTooBig = 10,
    Locked = 11,
    NoChunkServers = 12,
    NoChunk = 13,
    ChunkBusy = 14,
    WrongVersion = 15,
    ChunkExist = 16,
    NoSpace = 17,
    Io = 18,
    BnumTooBig = 19,
    WrongSize = 20,
    WrongOffset = 21,
    CantConnect = 22,
    WrongChunkId = 23,
    Disconnected = 24,
    Crc = 25,
    Delayed = 26,
    Mismatch = 27,
    Erofs = 28,
    Quota = 29,
    BadSessionId = 30,
    BadPassword = 31,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::Eperm => "operation not permitted",
            ErrorCode::Enotdir => "not a directory",
            ErrorCode::Enoent => "no such file or directory",
            ErrorCode::Eacces => "permission denied",
            ErrorCode::Eexist => "file exists",
            ErrorCode::Einval => "invalid argument",
            ErrorCode::Enotempty => "directory not empty",
            ErrorCode::ChunkLost => "chunk lost",
            ErrorCode::OutOfMemory => "out of memory",
            ErrorCode::IndexTooBig => "index too big",
            ErrorCode::Locked => "resource temporarily locked",
            ErrorCode::NoChunkServers => "no chunk servers available",
            ErrorCode::NoChunk => "no such chunk",
            ErrorCode::ChunkBusy => "chunk is busy",
            ErrorCode::WrongVersion => "wrong chunk version",
            ErrorCode::ChunkExist => "chunk already exists",
            ErrorCode::NoSpace => "no space left on device",
            ErrorCode::Io => "I/O error",
            ErrorCode::BnumTooBig => "block number too big",
            ErrorCode::WrongSize => "wrong chunk size",
            ErrorCode::WrongOffset => "wrong offset",
            ErrorCode::CantConnect => "cannot connect",
            ErrorCode::WrongChunkId => "wrong chunk id",
            ErrorCode::Disconnected => "disconnected",
            ErrorCode::Crc => "CRC mismatch",
            ErrorCode::Delayed => "operation delayed",
            ErrorCode::Mismatch => "data mismatch",
            ErrorCode::Erofs => "read-only filesystem",
            ErrorCode::Quota => "quota exceeded",
            ErrorCode::BadSessionId => "bad session id",
            ErrorCode::BadPassword => "bad password",
        }
    }

    /// Whether this code is local-recoverable per §7: the planner may
    /// promote to the next wave with a different part rather than fail
    /// the whole read outright.
    pub fn is_local_recoverable(self) -> bool {
        matches!(
            self,
            ErrorCode::Crc | ErrorCode::Disconnected | ErrorCode::CantConnect | ErrorCode::Delayed
        )
    }

    /// Whether this code should cause the current chunk read to abort and
    /// re-query the master, or be retried with backoff (§7's "Escalate"
    /// class).
    pub fn is_escalate(self) -> bool {
        matches!(
            self,
            ErrorCode::WrongVersion
                | ErrorCode::WrongChunkId
                | ErrorCode::NoChunk
                | ErrorCode::ChunkBusy
                | ErrorCode::Locked
        )
    }

    /// Whether this code must surface to the caller without retry (§7's
    /// "Fatal" class).
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::Einval | ErrorCode::Eacces | ErrorCode::Erofs | ErrorCode::Mismatch
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = DeserializeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use ErrorCode::*;
        const TABLE: &[ErrorCode] = &[
            Ok,
            Eperm,
            Enotdir,
            Enoent,
            Eacces,
            Eexist,
            Einval,
            Enotempty,
            ChunkLost,
            OutOfMemory,
            IndexTooBig,
            Locked,
            NoChunkServers,
            NoChunk,
            ChunkBusy,
            WrongVersion,
            ChunkExist,
            NoSpace,
            Io,
            BnumTooBig,
            WrongSize,
            WrongOffset,
            CantConnect,
            WrongChunkId,
            Disconnected,
            Crc,
            Delayed,
            Mismatch,
            Erofs,
            Quota,
            BadSessionId,
            BadPassword,
        ];
        TABLE
            .get(code as usize)
            .copied()
            .ok_or(DeserializeError::UnknownCode(code as u16))
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> u8 {
        code as u8
    }
}
