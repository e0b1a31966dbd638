//! Statements and control flow.
//!
//! # Jump skeletons
//!
//! ```text
//! IF c1 ... ELSEIF c2 ... ELSE ... END
//!
//!     c1; Jf ─────┐          ; branch entry If { start }
//!     body1       │
//!     Jmp ────────┼──────┐   ; else_pos of the If entry
//!     c2; Jf ◄────┘ ──┐  │   ; branch entry ElseIf { start }
//!     body2           │  │
//!     Jmp ────────────┼──┤   ; else_pos of the ElseIf entry
//!     else body ◄─────┘  │
//!     ...        ◄───────┘
//!
//! WHILE c ... END                 DO ... UNTIL c
//!
//!     c; Jf ───────┐                  body ◄─────┐
//!     body         │                  c; Jf ─────┘
//!     Jmp (to c)   │
//!     ...   ◄──────┘
//! ```
//!
//! Every forward jump is emitted with a zero placeholder and pushed onto
//! the branch or loop stack; the closing statement pops the entries it
//! owns and patches them. A procedure ends with both stacks empty.

use super::{
    BranchEntry, BranchKind, ExprResult, ExprTranslator, LoopEntry, ProcedureState, UnitContext,
};
use crate::bytecode::{InstrOffset, Opcode};
use crate::ops;
use crate::types::Primitive;
use crate::values::ValueId;
use tally_core::{CompileError, CompileResult, MessageCode, Span};

/// Compiles statements of one procedure.
pub struct StatementCompiler<'a> {
    unit: &'a mut UnitContext,
    proc: &'a mut ProcedureState,
}

impl<'a> StatementCompiler<'a> {
    /// Create a statement compiler emitting into `proc`.
    pub fn new(unit: &'a mut UnitContext, proc: &'a mut ProcedureState) -> Self {
        Self { unit, proc }
    }

    fn translate(&mut self, id: ValueId) -> CompileResult<ExprResult> {
        ExprTranslator::new(self.unit, self.proc).translate(id)
    }

    fn condition(&mut self, id: ValueId) -> CompileResult<()> {
        let cond = self.translate(id)?;
        if !cond.is_unknown() && cond.basic() != Some(Primitive::Bool) {
            self.unit.error(
                MessageCode::ConditionNotBool,
                cond.span,
                format!("condition must be BOOL, found {}", cond.ty.ty),
            );
        }
        Ok(())
    }

    fn here(&self) -> InstrOffset {
        self.proc.code.current_offset()
    }

    // =========================================================================
    // Simple Statements
    // =========================================================================

    /// An expression evaluated for its effect; the value is discarded.
    pub fn expression(&mut self, expr: ValueId) -> CompileResult<()> {
        self.translate(expr)?;
        self.proc.code.emit_u8(Opcode::Cts, 1)?;
        Ok(())
    }

    /// `RETURN expr`.
    ///
    /// The return instruction is emitted even when the value does not
    /// match the declared return type. A body whose header was rejected
    /// has an unknown return type and is not checked again.
    pub fn return_value(&mut self, expr: ValueId) -> CompileResult<()> {
        let value = self.translate(expr)?;
        let expected = self.proc.return_type;
        let checked = !value.is_unknown() && !expected.ty.is_unknown();
        if checked && ops::resolve_assignment(&self.unit.fields, expected, value.ty, false).is_err()
        {
            self.unit.error(
                MessageCode::ReturnTypeMismatch,
                value.span,
                format!(
                    "cannot return {} from procedure `{}` returning {}",
                    value.ty.ty, self.proc.name, expected.ty
                ),
            );
        }
        self.proc.code.emit(Opcode::Ret)?;
        Ok(())
    }

    // =========================================================================
    // IF Chains
    // =========================================================================

    /// `IF cond`.
    pub fn begin_if(&mut self, cond: ValueId) -> CompileResult<()> {
        self.condition(cond)?;
        let start = self.proc.code.emit_jump(Opcode::Jf)?;
        self.proc.branches.push(BranchEntry {
            kind: BranchKind::If,
            start,
            else_pos: None,
            has_else: false,
        });
        Ok(())
    }

    /// Close the current arm with a jump past the chain and route its
    /// conditional jump here. Returns `false` when no arm can be closed.
    fn close_arm(&mut self, span: Span, what: &str) -> CompileResult<bool> {
        let open = self.proc.branches.last().map(|entry| entry.has_else);
        match open {
            None => {
                self.unit.error(
                    MessageCode::MisplacedElse,
                    span,
                    format!("{what} without a matching IF"),
                );
                Ok(false)
            }
            Some(true) => {
                self.unit.error(
                    MessageCode::MisplacedElse,
                    span,
                    format!("{what} after ELSE"),
                );
                Ok(false)
            }
            Some(false) => {
                let jump = self.proc.code.emit_jump(Opcode::Jmp)?;
                let here = self.here();
                let (start, entry) = match self.proc.branches.last_mut() {
                    Some(entry) => (entry.start, entry),
                    None => return Err(unbalanced("branch stack emptied while closing an arm")),
                };
                entry.else_pos = Some(jump);
                self.proc.code.patch_jump(start, here)?;
                Ok(true)
            }
        }
    }

    /// `ELSEIF cond`.
    pub fn begin_elseif(&mut self, cond: ValueId, span: Span) -> CompileResult<()> {
        if !self.close_arm(span, "ELSEIF")? {
            return self.condition(cond);
        }
        self.condition(cond)?;
        let start = self.proc.code.emit_jump(Opcode::Jf)?;
        self.proc.branches.push(BranchEntry {
            kind: BranchKind::ElseIf,
            start,
            else_pos: None,
            has_else: false,
        });
        Ok(())
    }

    /// `ELSE`.
    pub fn begin_else(&mut self, span: Span) -> CompileResult<()> {
        if self.close_arm(span, "ELSE")? {
            if let Some(entry) = self.proc.branches.last_mut() {
                entry.has_else = true;
            }
        }
        Ok(())
    }

    /// `END` of an `IF` chain: patch every pending jump of the chain to
    /// the next instruction.
    pub fn end_if(&mut self) -> CompileResult<()> {
        let end = self.here();
        loop {
            let entry = self
                .proc
                .branches
                .pop()
                .ok_or_else(|| unbalanced("END without an open IF"))?;
            self.proc
                .code
                .patch_jump(entry.else_pos.unwrap_or(entry.start), end)?;
            if entry.kind == BranchKind::If {
                return Ok(());
            }
        }
    }

    // =========================================================================
    // Loops
    // =========================================================================

    /// `WHILE cond`.
    pub fn begin_while(&mut self, cond: ValueId) -> CompileResult<()> {
        let start = self.here();
        self.condition(cond)?;
        let exit = self.proc.code.emit_jump(Opcode::Jf)?;
        self.proc.loops.push(LoopEntry::While { start, exit });
        Ok(())
    }

    /// `END` of a `WHILE` loop.
    pub fn end_while(&mut self) -> CompileResult<()> {
        let start = match self.innermost_loop() {
            Some(LoopEntry::While { start, .. }) => start,
            _ => return Err(unbalanced("END WHILE without an open WHILE")),
        };
        self.proc.code.emit_jump_to(Opcode::Jmp, start)?;
        let end = self.here();
        loop {
            match self.pop_loop()? {
                LoopEntry::Break { jump } => self.proc.code.patch_jump(jump, end)?,
                LoopEntry::Continue { jump } => self.proc.code.patch_jump(jump, start)?,
                LoopEntry::While { exit, .. } => {
                    self.proc.code.patch_jump(exit, end)?;
                    return Ok(());
                }
                LoopEntry::Until { .. } => {
                    return Err(unbalanced("UNTIL loop closed by END WHILE"));
                }
            }
        }
    }

    /// `DO`: start of an `UNTIL` loop body.
    pub fn begin_until(&mut self) -> CompileResult<()> {
        let start = self.here();
        self.proc.loops.push(LoopEntry::Until { start });
        Ok(())
    }

    /// `UNTIL cond`: loop back while the condition is false.
    pub fn end_until(&mut self, cond: ValueId) -> CompileResult<()> {
        if !matches!(self.innermost_loop(), Some(LoopEntry::Until { .. })) {
            return Err(unbalanced("UNTIL without an open DO"));
        }
        let check = self.here();
        self.condition(cond)?;
        let back = self.proc.code.emit_jump(Opcode::Jf)?;
        let end = self.here();
        loop {
            match self.pop_loop()? {
                LoopEntry::Break { jump } => self.proc.code.patch_jump(jump, end)?,
                LoopEntry::Continue { jump } => self.proc.code.patch_jump(jump, check)?,
                LoopEntry::Until { start } => {
                    self.proc.code.patch_jump(back, start)?;
                    return Ok(());
                }
                LoopEntry::While { .. } => {
                    return Err(unbalanced("WHILE loop closed by UNTIL"));
                }
            }
        }
    }

    /// `BREAK`.
    pub fn break_loop(&mut self, span: Span) -> CompileResult<()> {
        if self.innermost_loop().is_none() {
            self.unit
                .error(MessageCode::BreakOutsideLoop, span, "break used outside a loop");
            return Ok(());
        }
        let jump = self.proc.code.emit_jump(Opcode::Jmp)?;
        self.proc.loops.push(LoopEntry::Break { jump });
        Ok(())
    }

    /// `CONTINUE`.
    ///
    /// Inside `WHILE` the condition offset is already known and the jump is
    /// resolved immediately.
    pub fn continue_loop(&mut self, span: Span) -> CompileResult<()> {
        match self.innermost_loop() {
            None => {
                self.unit.error(
                    MessageCode::ContinueOutsideLoop,
                    span,
                    "continue used outside a loop",
                );
            }
            Some(LoopEntry::While { start, .. }) => {
                self.proc.code.emit_jump_to(Opcode::Jmp, start)?;
            }
            Some(_) => {
                let jump = self.proc.code.emit_jump(Opcode::Jmp)?;
                self.proc.loops.push(LoopEntry::Continue { jump });
            }
        }
        Ok(())
    }

    fn innermost_loop(&self) -> Option<LoopEntry> {
        self.proc.loops.iter().rev().find(|e| e.is_loop()).copied()
    }

    fn pop_loop(&mut self) -> CompileResult<LoopEntry> {
        self.proc
            .loops
            .pop()
            .ok_or_else(|| unbalanced("loop stack emptied before its loop entry"))
    }

    // =========================================================================
    // SYNC Blocks
    // =========================================================================

    /// `SYNC`: open a synchronized block.
    ///
    /// Blocks may not nest and a procedure has at most
    /// `max_sync_blocks` of them. A rejected block is still tracked so
    /// that its `END` is accepted quietly.
    pub fn begin_sync(&mut self, span: Span) -> CompileResult<()> {
        let proc = &mut *self.proc;
        if proc.in_sync() {
            proc.sync_rejected += 1;
            self.unit.error(
                MessageCode::NestedSync,
                span,
                "sync blocks cannot be nested",
            );
            return Ok(());
        }
        let index = proc.sync >> 1;
        let limit = u32::from(self.unit.config.max_sync_blocks);
        let Some(operand) = u8::try_from(index).ok().filter(|_| index < limit) else {
            proc.sync_rejected += 1;
            self.unit.error(
                MessageCode::TooManySyncBlocks,
                span,
                format!("too many sync blocks in procedure `{}` (limit {limit})", proc.name),
            );
            return Ok(());
        };
        proc.code.emit_u8(Opcode::BSync, operand)?;
        proc.sync += 1;
        tracing::trace!(
            target: "tally::codegen",
            procedure = %proc.name,
            index,
            "sync block opened"
        );
        Ok(())
    }

    /// `END` of a synchronized block.
    pub fn end_sync(&mut self) -> CompileResult<()> {
        let proc = &mut *self.proc;
        if proc.sync_rejected > 0 {
            proc.sync_rejected -= 1;
            return Ok(());
        }
        if proc.sync & 1 == 0 {
            return Err(CompileError::internal_with(
                MessageCode::SyncNotOpen,
                "END SYNC without an open sync block",
            ));
        }
        let index = proc.sync >> 1;
        // The index was range checked when the block was opened.
        proc.code.emit_u8(Opcode::ESync, index as u8)?;
        proc.sync += 1;
        Ok(())
    }
}

fn unbalanced(message: &str) -> CompileError {
    CompileError::internal_with(MessageCode::UnbalancedBackpatch, message)
}
