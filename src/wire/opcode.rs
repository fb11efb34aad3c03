// src/wire/opcode.rs

/// The wire opcodes the dispatcher classifies requests by, plus `Reply`
/// which only ever appears on outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Reply,
    Msg,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
}

impl Opcode {
    pub fn from_i32(code: i32) -> Option<Self> {
        Some(match code {
            1 => Opcode::Reply,
            1000 => Opcode::Msg,
            2001 => Opcode::Update,
            2002 => Opcode::Insert,
            2004 => Opcode::Query,
            2005 => Opcode::GetMore,
            2006 => Opcode::Delete,
            2007 => Opcode::KillCursors,
            _ => return None,
        })
    }

    pub fn to_i32(self) -> i32 {
        match self {
            Opcode::Reply => 1,
            Opcode::Msg => 1000,
            Opcode::Update => 2001,
            Opcode::Insert => 2002,
            Opcode::Query => 2004,
            Opcode::GetMore => 2005,
            Opcode::Delete => 2006,
            Opcode::KillCursors => 2007,
        }
    }

    /// Whether this opcode can mutate the on-disk state and therefore
    /// contributes to the write-side diag-log bit.
    pub fn is_write(self) -> bool {
        matches!(self, Opcode::Update | Opcode::Insert | Opcode::Delete)
    }

    /// Whether this opcode only reads and therefore contributes to the
    /// read-side diag-log bit.
    pub fn is_read(self) -> bool {
        matches!(self, Opcode::Query | Opcode::GetMore)
    }
}
