//! Operator resolution tables.
//!
//! Each binary table is an 18×18 grid indexed by `[left][right]` primitive
//! discriminants; unary tables are indexed by the operand. The tables are
//! built at compile time from a small set of promotion rules, so every
//! table that should be symmetric is symmetric by construction.

use crate::bytecode::Opcode;
use crate::types::Primitive;

const N: usize = Primitive::COUNT;

/// A resolved table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// Opcode to emit.
    pub opcode: Opcode,
    /// Primitive of the result.
    pub result: Primitive,
    /// Integer operands of different signedness.
    pub sign_mismatch: bool,
}

/// `[left][right]` dispatch table; `None` means not applicable.
pub type BinaryTable = [[Option<TableEntry>; N]; N];

/// Dispatch table of a unary operator.
pub type UnaryTable = [Option<TableEntry>; N];

#[derive(Clone, Copy)]
struct CompareOps {
    int: Opcode,
    uint: Opcode,
    real: Opcode,
    rich: Opcode,
    ch: Opcode,
    date: Opcode,
    datetime: Opcode,
    hires: Opcode,
}

#[derive(Clone, Copy)]
enum Rule {
    Arithmetic {
        int: Opcode,
        uint: Opcode,
        real: Opcode,
        rich: Opcode,
        text: Option<Opcode>,
    },
    Modulo,
    Ordering(CompareOps),
    Equality {
        cmp: CompareOps,
        boolean: Opcode,
        text: Opcode,
    },
    Logical {
        int: Opcode,
        boolean: Opcode,
    },
    Store,
}

const fn same(a: Primitive, b: Primitive) -> bool {
    a as u8 == b as u8
}

const fn hit(opcode: Opcode, result: Primitive) -> Option<TableEntry> {
    Some(TableEntry {
        opcode,
        result,
        sign_mismatch: false,
    })
}

const fn integer_cell(
    l: Primitive,
    r: Primitive,
    signed: Opcode,
    unsigned: Opcode,
    result: Option<Primitive>,
) -> Option<TableEntry> {
    let both_unsigned = l.is_unsigned() && r.is_unsigned();
    let (opcode, wide) = if both_unsigned {
        (unsigned, Primitive::UInt64)
    } else {
        (signed, Primitive::Int64)
    };
    Some(TableEntry {
        opcode,
        result: match result {
            Some(p) => p,
            None => wide,
        },
        sign_mismatch: l.is_signed() != r.is_signed(),
    })
}

const fn compare_cell(l: Primitive, r: Primitive, ops: CompareOps) -> Option<TableEntry> {
    if l.is_integer() && r.is_integer() {
        integer_cell(l, r, ops.int, ops.uint, Some(Primitive::Bool))
    } else if l.is_numeric() && r.is_numeric() {
        if same(l, Primitive::RichReal) || same(r, Primitive::RichReal) {
            hit(ops.rich, Primitive::Bool)
        } else {
            hit(ops.real, Primitive::Bool)
        }
    } else if same(l, Primitive::Char) && same(r, Primitive::Char) {
        hit(ops.ch, Primitive::Bool)
    } else if l.is_time() && r.is_time() {
        let rank = if l.time_rank() > r.time_rank() {
            l.time_rank()
        } else {
            r.time_rank()
        };
        let opcode = match rank {
            1 => ops.date,
            2 => ops.datetime,
            _ => ops.hires,
        };
        hit(opcode, Primitive::Bool)
    } else {
        None
    }
}

const fn store_opcode(dst: Primitive) -> Option<Opcode> {
    match dst {
        Primitive::Bool => Some(Opcode::StoB),
        Primitive::Char => Some(Opcode::StoC),
        Primitive::Date => Some(Opcode::StoD),
        Primitive::DateTime => Some(Opcode::StoDT),
        Primitive::HiresTime => Some(Opcode::StoHT),
        Primitive::Int8 => Some(Opcode::StoI8),
        Primitive::Int16 => Some(Opcode::StoI16),
        Primitive::Int32 => Some(Opcode::StoI32),
        Primitive::Int64 => Some(Opcode::StoI64),
        Primitive::UInt8 => Some(Opcode::StoU8),
        Primitive::UInt16 => Some(Opcode::StoU16),
        Primitive::UInt32 => Some(Opcode::StoU32),
        Primitive::UInt64 => Some(Opcode::StoU64),
        Primitive::Real => Some(Opcode::StoR),
        Primitive::RichReal => Some(Opcode::StoRR),
        Primitive::Text => Some(Opcode::StoT),
        Primitive::Unknown | Primitive::Undetermined => None,
    }
}

const fn store_cell(dst: Primitive, src: Primitive) -> Option<TableEntry> {
    let Some(opcode) = store_opcode(dst) else {
        return None;
    };
    let accepted = if same(src, Primitive::Undetermined) {
        true
    } else if dst.is_integer() {
        src.is_integer()
    } else if dst.is_real() {
        src.is_numeric()
    } else if dst.is_time() {
        src.is_time() && src.time_rank() <= dst.time_rank()
    } else {
        match dst {
            Primitive::Char => same(src, Primitive::Char),
            Primitive::Text => same(src, Primitive::Text) || same(src, Primitive::Char),
            Primitive::Bool => same(src, Primitive::Bool),
            _ => false,
        }
    };
    if !accepted {
        return None;
    }
    Some(TableEntry {
        opcode,
        result: dst,
        sign_mismatch: dst.is_integer() && src.is_integer() && dst.is_signed() != src.is_signed(),
    })
}

const fn cell(rule: Rule, l: Primitive, r: Primitive) -> Option<TableEntry> {
    match rule {
        Rule::Arithmetic {
            int,
            uint,
            real,
            rich,
            text,
        } => {
            if l.is_integer() && r.is_integer() {
                integer_cell(l, r, int, uint, None)
            } else if l.is_numeric() && r.is_numeric() {
                if same(l, Primitive::RichReal) || same(r, Primitive::RichReal) {
                    hit(rich, Primitive::RichReal)
                } else {
                    hit(real, Primitive::Real)
                }
            } else if let Some(concat) = text {
                let l_text = same(l, Primitive::Text);
                let r_text = same(r, Primitive::Text);
                let l_char = same(l, Primitive::Char);
                let r_char = same(r, Primitive::Char);
                if (l_text && (r_text || r_char)) || (l_char && r_text) {
                    hit(concat, Primitive::Text)
                } else {
                    None
                }
            } else {
                None
            }
        }
        Rule::Modulo => {
            if l.is_integer() && r.is_integer() {
                let (opcode, result) = if l.is_unsigned() {
                    (Opcode::ModU, Primitive::UInt64)
                } else {
                    (Opcode::Mod, Primitive::Int64)
                };
                Some(TableEntry {
                    opcode,
                    result,
                    sign_mismatch: l.is_signed() != r.is_signed(),
                })
            } else {
                None
            }
        }
        Rule::Ordering(ops) => compare_cell(l, r, ops),
        Rule::Equality { cmp, boolean, text } => {
            if same(l, Primitive::Bool) && same(r, Primitive::Bool) {
                hit(boolean, Primitive::Bool)
            } else if same(l, Primitive::Text) && same(r, Primitive::Text) {
                hit(text, Primitive::Bool)
            } else {
                compare_cell(l, r, cmp)
            }
        }
        Rule::Logical { int, boolean } => {
            if same(l, Primitive::Bool) && same(r, Primitive::Bool) {
                hit(boolean, Primitive::Bool)
            } else if l.is_integer() && r.is_integer() {
                integer_cell(l, r, int, int, None)
            } else {
                None
            }
        }
        Rule::Store => store_cell(l, r),
    }
}

const fn build(rule: Rule) -> BinaryTable {
    let mut table = [[None; N]; N];
    let mut l = 0;
    while l < N {
        let mut r = 0;
        while r < N {
            table[l][r] = cell(rule, Primitive::ALL[l], Primitive::ALL[r]);
            r += 1;
        }
        l += 1;
    }
    table
}

const fn step_cell(p: Primitive, ops: [Opcode; 7]) -> Option<TableEntry> {
    let opcode = if p.is_integer() {
        ops[0]
    } else {
        match p {
            Primitive::Char => ops[1],
            Primitive::Real => ops[2],
            Primitive::RichReal => ops[3],
            Primitive::Date => ops[4],
            Primitive::DateTime => ops[5],
            Primitive::HiresTime => ops[6],
            _ => return None,
        }
    };
    hit(opcode, p)
}

const fn build_step(ops: [Opcode; 7]) -> UnaryTable {
    let mut table = [None; N];
    let mut i = 0;
    while i < N {
        table[i] = step_cell(Primitive::ALL[i], ops);
        i += 1;
    }
    table
}

const fn build_not() -> UnaryTable {
    let mut table = [None; N];
    let mut i = 0;
    while i < N {
        let p = Primitive::ALL[i];
        table[i] = if same(p, Primitive::Bool) {
            hit(Opcode::NotB, Primitive::Bool)
        } else if p.is_unsigned() {
            hit(Opcode::Not, Primitive::UInt64)
        } else if p.is_signed() {
            hit(Opcode::Not, Primitive::Int64)
        } else {
            None
        };
        i += 1;
    }
    table
}

macro_rules! compare_ops {
    ($int:ident, $uint:ident, $real:ident, $rich:ident, $ch:ident, $d:ident, $dt:ident, $ht:ident) => {
        CompareOps {
            int: Opcode::$int,
            uint: Opcode::$uint,
            real: Opcode::$real,
            rich: Opcode::$rich,
            ch: Opcode::$ch,
            date: Opcode::$d,
            datetime: Opcode::$dt,
            hires: Opcode::$ht,
        }
    };
}

// =============================================================================
// Arithmetic
// =============================================================================

/// `+`
pub static ADD: BinaryTable = build(Rule::Arithmetic {
    int: Opcode::Add,
    uint: Opcode::Add,
    real: Opcode::AddR,
    rich: Opcode::AddRR,
    text: Some(Opcode::AddT),
});

/// `-`
pub static SUB: BinaryTable = build(Rule::Arithmetic {
    int: Opcode::Sub,
    uint: Opcode::Sub,
    real: Opcode::SubR,
    rich: Opcode::SubRR,
    text: None,
});

/// `*`
pub static MUL: BinaryTable = build(Rule::Arithmetic {
    int: Opcode::Mul,
    uint: Opcode::Mul,
    real: Opcode::MulR,
    rich: Opcode::MulRR,
    text: None,
});

/// `/`
pub static DIV: BinaryTable = build(Rule::Arithmetic {
    int: Opcode::Div,
    uint: Opcode::DivU,
    real: Opcode::DivR,
    rich: Opcode::DivRR,
    text: None,
});

/// `%`; the result follows the dividend, so the table is not symmetric.
pub static MOD: BinaryTable = build(Rule::Modulo);

// =============================================================================
// Comparison
// =============================================================================

/// `<`
pub static LT: BinaryTable = build(Rule::Ordering(compare_ops!(
    Lt, LtU, LtR, LtRR, LtC, LtD, LtDT, LtHT
)));

/// `<=`
pub static LE: BinaryTable = build(Rule::Ordering(compare_ops!(
    Le, LeU, LeR, LeRR, LeC, LeD, LeDT, LeHT
)));

/// `>`
pub static GT: BinaryTable = build(Rule::Ordering(compare_ops!(
    Gt, GtU, GtR, GtRR, GtC, GtD, GtDT, GtHT
)));

/// `>=`
pub static GE: BinaryTable = build(Rule::Ordering(compare_ops!(
    Ge, GeU, GeR, GeRR, GeC, GeD, GeDT, GeHT
)));

/// `=`
pub static EQ: BinaryTable = build(Rule::Equality {
    cmp: compare_ops!(Eq, Eq, EqR, EqRR, EqC, EqD, EqDT, EqHT),
    boolean: Opcode::EqB,
    text: Opcode::EqT,
});

/// `<>`
pub static NE: BinaryTable = build(Rule::Equality {
    cmp: compare_ops!(Ne, Ne, NeR, NeRR, NeC, NeD, NeDT, NeHT),
    boolean: Opcode::NeB,
    text: Opcode::NeT,
});

// =============================================================================
// Logical
// =============================================================================

/// `OR`
pub static OR: BinaryTable = build(Rule::Logical {
    int: Opcode::Or,
    boolean: Opcode::OrB,
});

/// `AND`
pub static AND: BinaryTable = build(Rule::Logical {
    int: Opcode::And,
    boolean: Opcode::AndB,
});

/// `XOR`
pub static XOR: BinaryTable = build(Rule::Logical {
    int: Opcode::Xor,
    boolean: Opcode::XorB,
});

// =============================================================================
// Store and Unary
// =============================================================================

/// Assignment, indexed `[destination][source]`.
pub static STORE: BinaryTable = build(Rule::Store);

/// `++`
pub static INC: UnaryTable = build_step([
    Opcode::Inc,
    Opcode::IncC,
    Opcode::IncR,
    Opcode::IncRR,
    Opcode::IncD,
    Opcode::IncDT,
    Opcode::IncHT,
]);

/// `--`
pub static DEC: UnaryTable = build_step([
    Opcode::Dec,
    Opcode::DecC,
    Opcode::DecR,
    Opcode::DecRR,
    Opcode::DecD,
    Opcode::DecDT,
    Opcode::DecHT,
]);

/// `NOT`
pub static NOT: UnaryTable = build_not();

#[cfg(test)]
mod tests {
    use super::*;

    fn at(table: &BinaryTable, l: Primitive, r: Primitive) -> Option<TableEntry> {
        table[l.index()][r.index()]
    }

    #[test]
    fn test_unknown_row_and_column_not_applicable() {
        for table in [&ADD, &SUB, &MUL, &DIV, &MOD, &LT, &EQ, &OR, &STORE] {
            for p in Primitive::ALL {
                assert!(at(table, Primitive::Unknown, p).is_none());
                assert!(at(table, p, Primitive::Unknown).is_none());
            }
        }
    }

    #[test]
    fn test_undetermined_only_as_store_source() {
        for p in Primitive::ALL {
            assert!(at(&ADD, Primitive::Undetermined, p).is_none());
            assert!(at(&EQ, p, Primitive::Undetermined).is_none());
            assert!(at(&STORE, Primitive::Undetermined, p).is_none());
        }
        assert!(at(&STORE, Primitive::Bool, Primitive::Undetermined).is_some());
        assert!(at(&STORE, Primitive::Text, Primitive::Undetermined).is_some());
    }

    #[test]
    fn test_integer_widening() {
        let e = at(&ADD, Primitive::Int8, Primitive::Int16).unwrap();
        assert_eq!(e.opcode, Opcode::Add);
        assert_eq!(e.result, Primitive::Int64);
        assert!(!e.sign_mismatch);

        let e = at(&ADD, Primitive::UInt8, Primitive::UInt32).unwrap();
        assert_eq!(e.result, Primitive::UInt64);

        let e = at(&ADD, Primitive::UInt8, Primitive::Int32).unwrap();
        assert_eq!(e.result, Primitive::Int64);
        assert!(e.sign_mismatch);
    }

    #[test]
    fn test_real_promotion() {
        assert_eq!(
            at(&MUL, Primitive::Int32, Primitive::Real).unwrap().opcode,
            Opcode::MulR
        );
        let e = at(&MUL, Primitive::Real, Primitive::RichReal).unwrap();
        assert_eq!(e.opcode, Opcode::MulRR);
        assert_eq!(e.result, Primitive::RichReal);
    }

    #[test]
    fn test_unsigned_division() {
        assert_eq!(
            at(&DIV, Primitive::UInt16, Primitive::UInt64).unwrap().opcode,
            Opcode::DivU
        );
        assert_eq!(
            at(&DIV, Primitive::UInt16, Primitive::Int64).unwrap().opcode,
            Opcode::Div
        );
    }

    #[test]
    fn test_modulo_follows_dividend() {
        let e = at(&MOD, Primitive::UInt8, Primitive::Int8).unwrap();
        assert_eq!(e.opcode, Opcode::ModU);
        assert_eq!(e.result, Primitive::UInt64);
        assert!(e.sign_mismatch);

        let e = at(&MOD, Primitive::Int8, Primitive::UInt8).unwrap();
        assert_eq!(e.opcode, Opcode::Mod);
        assert!(at(&MOD, Primitive::Real, Primitive::Int8).is_none());
    }

    #[test]
    fn test_text_concatenation() {
        assert_eq!(
            at(&ADD, Primitive::Text, Primitive::Char).unwrap().opcode,
            Opcode::AddT
        );
        assert_eq!(
            at(&ADD, Primitive::Char, Primitive::Text).unwrap().result,
            Primitive::Text
        );
        assert!(at(&ADD, Primitive::Char, Primitive::Char).is_none());
        assert!(at(&SUB, Primitive::Text, Primitive::Text).is_none());
        assert!(at(&ADD, Primitive::Text, Primitive::Int8).is_none());
    }

    #[test]
    fn test_time_comparison_promotes() {
        assert_eq!(
            at(&LT, Primitive::Date, Primitive::HiresTime).unwrap().opcode,
            Opcode::LtHT
        );
        assert_eq!(
            at(&GE, Primitive::DateTime, Primitive::Date).unwrap().opcode,
            Opcode::GeDT
        );
        assert!(at(&LT, Primitive::Bool, Primitive::Bool).is_none());
        assert!(at(&LT, Primitive::Text, Primitive::Text).is_none());
    }

    #[test]
    fn test_equality_extras() {
        assert_eq!(
            at(&EQ, Primitive::Bool, Primitive::Bool).unwrap().opcode,
            Opcode::EqB
        );
        assert_eq!(
            at(&NE, Primitive::Text, Primitive::Text).unwrap().opcode,
            Opcode::NeT
        );
        assert_eq!(
            at(&EQ, Primitive::UInt8, Primitive::UInt8).unwrap().opcode,
            Opcode::Eq
        );
    }

    #[test]
    fn test_logical_and_bitwise() {
        assert_eq!(
            at(&OR, Primitive::Bool, Primitive::Bool).unwrap().opcode,
            Opcode::OrB
        );
        let e = at(&AND, Primitive::UInt8, Primitive::UInt16).unwrap();
        assert_eq!(e.opcode, Opcode::And);
        assert_eq!(e.result, Primitive::UInt64);
        assert!(at(&XOR, Primitive::Bool, Primitive::Int8).is_none());
    }

    #[test]
    fn test_store_rules() {
        let e = at(&STORE, Primitive::Int8, Primitive::UInt64).unwrap();
        assert_eq!(e.opcode, Opcode::StoI8);
        assert!(e.sign_mismatch);
        assert_eq!(
            at(&STORE, Primitive::Real, Primitive::RichReal).unwrap().opcode,
            Opcode::StoR
        );
        assert!(at(&STORE, Primitive::Int8, Primitive::Real).is_none());
        assert!(at(&STORE, Primitive::HiresTime, Primitive::Date).is_some());
        assert!(at(&STORE, Primitive::Date, Primitive::HiresTime).is_none());
        assert!(at(&STORE, Primitive::Text, Primitive::Char).is_some());
        assert!(at(&STORE, Primitive::Char, Primitive::Text).is_none());
        assert!(at(&STORE, Primitive::Bool, Primitive::Int8).is_none());
    }

    #[test]
    fn test_unary_tables() {
        assert_eq!(INC[Primitive::Int16.index()].unwrap().opcode, Opcode::Inc);
        assert_eq!(
            INC[Primitive::Int16.index()].unwrap().result,
            Primitive::Int16
        );
        assert_eq!(DEC[Primitive::DateTime.index()].unwrap().opcode, Opcode::DecDT);
        assert!(INC[Primitive::Bool.index()].is_none());
        assert!(INC[Primitive::Text.index()].is_none());
        assert_eq!(NOT[Primitive::Bool.index()].unwrap().opcode, Opcode::NotB);
        assert_eq!(NOT[Primitive::UInt8.index()].unwrap().result, Primitive::UInt64);
        assert!(NOT[Primitive::Real.index()].is_none());
    }
}
