//! Item filter predicates used by area and surface searches.
//!
//! A loopscript is a byte string evaluated as a stack machine against one
//! candidate item. It is validated once by [`LoopScript::parse`] and then
//! evaluated per item by [`LoopScript::matches`].

use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::shape::ShapeTable;

/// Byte values of loopscript tokens.
pub mod token {
    pub const FALSE: u8 = 0x00;
    pub const TRUE: u8 = 0x01;
    pub const END: u8 = b'$';
    pub const INT: u8 = b'%';
    pub const AND: u8 = b'&';
    pub const OR: u8 = b'+';
    pub const NOT: u8 = b'!';
    pub const STATUS: u8 = b'?';
    pub const QUALITY: u8 = b'*';
    pub const NPC_NUM: u8 = b'#';
    pub const EQUAL: u8 = b'=';
    pub const GREATER: u8 = b'>';
    pub const LESS: u8 = b'<';
    pub const GEQUAL: u8 = b']';
    pub const LEQUAL: u8 = b'[';
    pub const FAMILY: u8 = b':';
    pub const SHAPE: u8 = b';';
    pub const FRAME: u8 = b'(';
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopScriptError {
    #[error("script has no end token")]
    Unterminated,
    #[error("operand of token at byte {offset} runs past the end")]
    Truncated { offset: usize },
    #[error("unknown token {token:#04x} at byte {offset}")]
    UnknownToken { offset: usize, token: u8 },
    #[error("token at byte {offset} needs more values than the stack holds")]
    StackUnderflow { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Cmp {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Field {
    Status,
    Quality,
    NpcNum,
    Family,
    Shape,
    Frame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Op {
    Push(i32),
    Field(Field),
    And,
    Or,
    Not,
    Compare(Cmp),
    ShapeIn(Vec<u16>),
    FrameIn(Vec<u16>),
}

/// A validated loopscript program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopScript {
    ops: Vec<Op>,
}

impl LoopScript {
    /// The script that accepts every item.
    pub fn any() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, LoopScriptError> {
        let mut ops = Vec::new();
        // evaluation starts with an implicit `true` on the stack
        let mut depth = 1usize;
        let mut i = 0usize;
        loop {
            let Some(&tok) = bytes.get(i) else {
                return Err(LoopScriptError::Unterminated);
            };
            let offset = i;
            i += 1;
            let (op, pops) = match tok {
                token::END => break,
                token::FALSE => (Op::Push(0), 0),
                token::TRUE => (Op::Push(1), 0),
                token::INT => {
                    let v = read_u16(bytes, i, offset)?;
                    i += 2;
                    (Op::Push(v as i16 as i32), 0)
                }
                token::AND => (Op::And, 2),
                token::OR => (Op::Or, 2),
                token::NOT => (Op::Not, 1),
                token::STATUS => (Op::Field(Field::Status), 0),
                token::QUALITY => (Op::Field(Field::Quality), 0),
                token::NPC_NUM => (Op::Field(Field::NpcNum), 0),
                token::FAMILY => (Op::Field(Field::Family), 0),
                token::SHAPE => (Op::Field(Field::Shape), 0),
                token::FRAME => (Op::Field(Field::Frame), 0),
                token::EQUAL => (Op::Compare(Cmp::Eq), 2),
                token::GREATER => (Op::Compare(Cmp::Gt), 2),
                token::LESS => (Op::Compare(Cmp::Lt), 2),
                token::GEQUAL => (Op::Compare(Cmp::Ge), 2),
                token::LEQUAL => (Op::Compare(Cmp::Le), 2),
                b'A'..=b'Z' => {
                    let count = (tok - b'@') as usize;
                    let list = read_list(bytes, i, count, offset)?;
                    i += count * 2;
                    (Op::ShapeIn(list), 0)
                }
                b'a'..=b'z' => {
                    let count = (tok - b'`') as usize;
                    let list = read_list(bytes, i, count, offset)?;
                    i += count * 2;
                    (Op::FrameIn(list), 0)
                }
                other => {
                    return Err(LoopScriptError::UnknownToken {
                        offset,
                        token: other,
                    });
                }
            };
            if depth < pops {
                return Err(LoopScriptError::StackUnderflow { offset });
            }
            // every op leaves exactly one value behind
            depth = depth - pops + 1;
            ops.push(op);
        }
        Ok(Self { ops })
    }

    pub fn is_any(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn matches(&self, item: &Item, shapes: &ShapeTable) -> bool {
        let mut stack: Vec<i32> = Vec::with_capacity(self.ops.len() + 1);
        stack.push(1);
        for op in &self.ops {
            let value = match op {
                Op::Push(v) => *v,
                Op::Field(field) => field_value(*field, item, shapes),
                Op::Not => (pop(&mut stack) == 0) as i32,
                Op::And | Op::Or | Op::Compare(_) => {
                    let a = pop(&mut stack);
                    let b = pop(&mut stack);
                    match op {
                        Op::And => (a != 0 && b != 0) as i32,
                        Op::Or => (a != 0 || b != 0) as i32,
                        Op::Compare(Cmp::Eq) => (b == a) as i32,
                        Op::Compare(Cmp::Gt) => (b > a) as i32,
                        Op::Compare(Cmp::Lt) => (b < a) as i32,
                        Op::Compare(Cmp::Ge) => (b >= a) as i32,
                        Op::Compare(Cmp::Le) => (b <= a) as i32,
                        _ => 0,
                    }
                }
                Op::ShapeIn(list) => list.iter().any(|s| *s as u32 == item.shape) as i32,
                Op::FrameIn(list) => list.iter().any(|f| *f as u32 == item.frame) as i32,
            };
            stack.push(value);
        }
        stack.last().is_some_and(|v| *v != 0)
    }
}

impl Default for LoopScript {
    fn default() -> Self {
        Self::any()
    }
}

fn pop(stack: &mut Vec<i32>) -> i32 {
    stack.pop().unwrap_or(0)
}

fn field_value(field: Field, item: &Item, shapes: &ShapeTable) -> i32 {
    match field {
        Field::Status => item.flags.bits() as i32,
        Field::Quality => item.quality as i32,
        Field::NpcNum => item.npc_num as i32,
        Field::Family => item.family(shapes) as i32,
        Field::Shape => item.shape as i32,
        Field::Frame => item.frame as i32,
    }
}

fn read_u16(bytes: &[u8], at: usize, offset: usize) -> Result<u16, LoopScriptError> {
    match bytes.get(at..at + 2) {
        Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
        _ => Err(LoopScriptError::Truncated { offset }),
    }
}

fn read_list(
    bytes: &[u8],
    at: usize,
    count: usize,
    offset: usize,
) -> Result<Vec<u16>, LoopScriptError> {
    (0..count)
        .map(|n| read_u16(bytes, at + n * 2, offset))
        .collect()
}
