//! The bytecode reader: program text to in-memory blocks.
//!
//! Programs are UTF-8 text of single-character primitive operators plus
//! nested `[...]` block literals, `"..."` text literals (continuation
//! lines prefixed by a space, terminated by `~`), and `{token}` tokens.
//! Sealer and unsealer tokens become operand objects; recognized `{&…}`
//! annotations lower to dedicated operators and unrecognized ones are
//! dropped, which is always safe. A final pass collapses accelerator
//! expansions into single operators.
//!
//! Parsing happens on a host-side tree first; lowering then allocates
//! the operation lists from the back, keeping every intermediate rooted
//! in the context's scratch register so reservations may compact freely.

use std::str::Chars;

use crate::arena::Space;
use crate::consts::{cell_buff, CELL};
use crate::context::Context;
use crate::error::{RuntimeError, VmResult};
use crate::value::{hdr, ObjTag, Tag, Val};
use runic_asm::{valid_text_char, valid_token, Opcode, Token};

bitflags::bitflags! {
    /// Reader options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockOptions: u32 {
        /// Collapse accelerator expansions into single operators.
        const ACCELERATE = 1 << 0;
    }
}

impl Default for BlockOptions {
    fn default() -> Self {
        BlockOptions::ACCELERATE
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Op(Opcode),
    Block(Vec<Ast>),
    Text(String),
    Tok(Token),
}

fn parse_seq(it: &mut Chars<'_>, nested: bool) -> VmResult<Vec<Ast>> {
    let mut out = Vec::new();
    loop {
        match it.next() {
            None => {
                if nested {
                    return Err(RuntimeError::InvalidArgument);
                }
                return Ok(out);
            }
            Some(']') => {
                if !nested {
                    return Err(RuntimeError::InvalidArgument);
                }
                return Ok(out);
            }
            Some('[') => out.push(Ast::Block(parse_seq(it, true)?)),
            Some('"') => out.push(Ast::Text(parse_text(it)?)),
            Some('{') => {
                let mut tok = String::new();
                loop {
                    match it.next() {
                        None | Some('{') => return Err(RuntimeError::InvalidArgument),
                        Some('}') => break,
                        Some(c) => tok.push(c),
                    }
                }
                if !valid_token(&tok) {
                    return Err(RuntimeError::InvalidArgument);
                }
                if let Some(anno) = tok.strip_prefix('&') {
                    // Unrecognized annotations are dropped at parse time.
                    if let Some(op) = Opcode::from_annotation(anno) {
                        out.push(Ast::Op(op));
                    }
                } else {
                    let t = Token::try_from(tok.as_str())
                        .map_err(|_| RuntimeError::InvalidArgument)?;
                    out.push(Ast::Tok(t));
                }
            }
            Some(c) => match Opcode::from_char(c) {
                Some(op) => out.push(Ast::Op(op)),
                None => return Err(RuntimeError::InvalidArgument),
            },
        }
    }
}

/// Text literal body: runs to LF, then a space continues on the next
/// line (the LF is part of the text) and `~` terminates.
fn parse_text(it: &mut Chars<'_>) -> VmResult<String> {
    let mut s = String::new();
    loop {
        match it.next().ok_or(RuntimeError::InvalidArgument)? {
            '\n' => match it.next().ok_or(RuntimeError::InvalidArgument)? {
                ' ' => s.push('\n'),
                '~' => return Ok(s),
                _ => return Err(RuntimeError::InvalidArgument),
            },
            c if valid_text_char(c) => s.push(c),
            _ => return Err(RuntimeError::InvalidArgument),
        }
    }
}

/// Accelerator patterns, longest first so `vvrwlc` wins over the
/// `vrwlc` inside it.
fn accel_patterns() -> Vec<(Opcode, Vec<Opcode>)> {
    let mut pats: Vec<(Opcode, Vec<Opcode>)> = Opcode::ALL
        .iter()
        .filter(|op| op.is_accelerator() && **op != Opcode::TailCall)
        .map(|op| {
            let expansion = op
                .expansion()
                .unwrap_or_default()
                .chars()
                .filter_map(Opcode::from_char)
                .collect();
            (*op, expansion)
        })
        .collect();
    pats.sort_by_key(|(_, p)| std::cmp::Reverse(p.len()));
    pats
}

fn collapse_accels(ops: &mut Vec<Ast>) {
    for op in ops.iter_mut() {
        if let Ast::Block(inner) = op {
            collapse_accels(inner);
        }
    }
    let pats = accel_patterns();
    let mut i = 0;
    'scan: while i < ops.len() {
        for (accel, pat) in &pats {
            if matches_at(ops, i, pat) {
                ops.splice(i..i + pat.len(), [Ast::Op(*accel)]);
                i += 1;
                continue 'scan;
            }
        }
        i += 1;
    }
    // `$c` accelerates only in tail position, where the call's
    // continuation is empty.
    if ops.len() >= 2
        && ops[ops.len() - 2..] == [Ast::Op(Opcode::Apply), Ast::Op(Opcode::ElimUnit)]
    {
        let at = ops.len() - 2;
        ops.splice(at.., [Ast::Op(Opcode::TailCall)]);
    }
}

fn matches_at(ops: &[Ast], at: usize, pat: &[Opcode]) -> bool {
    ops.len() - at >= pat.len()
        && pat
            .iter()
            .zip(&ops[at..])
            .all(|(want, have)| matches!(have, Ast::Op(op) if op == want))
}

impl Space {
    // The scratch register holds a stack of partially built operation
    // lists, so every intermediate survives compaction.

    fn tmp_push_r(&mut self, r: usize, v: Val) {
        let t = self.regs(r).tmp;
        let cell = self.alloc_cell(Tag::ProdInL, v, t);
        self.regs_mut(r).tmp = cell;
    }

    fn tmp_pop(&mut self, r: usize) -> Val {
        let t = self.regs(r).tmp;
        let (head, rest) = self.cell_at(t.addr());
        self.regs_mut(r).tmp = rest;
        head
    }

    fn tmp_head(&self, r: usize) -> Val {
        self.val_at(self.regs(r).tmp.addr())
    }

    fn tmp_set_head(&mut self, r: usize, v: Val) {
        let a = self.regs(r).tmp.addr();
        self.set_word(a, v.raw());
    }

    /// Lower a parsed sequence into an operations list, leaving it on
    /// the scratch stack.
    fn lower_ops(&mut self, r: usize, items: &[Ast]) -> VmResult<()> {
        self.reserve(CELL)?;
        self.tmp_push_r(r, Val::UNIT_INR);
        for item in items.iter().rev() {
            match item {
                Ast::Op(op) => {
                    self.reserve(CELL)?;
                    let acc = self.tmp_head(r);
                    let cell =
                        self.alloc_cell(Tag::ProdInL, Val::small(*op as u8 as i64), acc);
                    self.tmp_set_head(r, cell);
                }
                Ast::Tok(t) => {
                    let sz = if t.as_str().starts_with(':')
                        && t.len() <= crate::consts::SEAL_INLINE_MAX
                    {
                        CELL
                    } else {
                        crate::value::seal_size(t.len())
                    };
                    self.reserve(sz + CELL)?;
                    let obj = self.alloc_seal(t.as_str(), None)?;
                    let acc = self.tmp_head(r);
                    let cell = self.alloc_cell(Tag::ProdInL, obj, acc);
                    self.tmp_set_head(r, cell);
                }
                Ast::Text(s) => {
                    let chunks = crate::context::plan_text_chunks(s);
                    let total: u64 = chunks
                        .iter()
                        .map(|c| 2 * CELL + cell_buff(c.len() as u64))
                        .sum::<u64>()
                        + 2 * CELL;
                    self.reserve(total)?;
                    let tv = self.build_text_r(&chunks, Val::UNIT_INR);
                    let opv = self.alloc_obj2(hdr(ObjTag::OpVal, 0), tv);
                    let acc = self.tmp_head(r);
                    let cell = self.alloc_cell(Tag::ProdInL, opv, acc);
                    self.tmp_set_head(r, cell);
                }
                Ast::Block(inner) => {
                    self.lower_ops(r, inner)?;
                    self.reserve(3 * CELL)?;
                    let inner_ops = self.tmp_pop(r);
                    let bk = self.alloc_obj2(hdr(ObjTag::Block, 0), inner_ops);
                    let opv = self.alloc_obj2(hdr(ObjTag::OpVal, 0), bk);
                    let acc = self.tmp_head(r);
                    let cell = self.alloc_cell(Tag::ProdInL, opv, acc);
                    self.tmp_set_head(r, cell);
                }
            }
        }
        Ok(())
    }

    /// `e → (block * e)`: parse and lower a bytecode program.
    pub(crate) fn intro_block(
        &mut self,
        r: usize,
        source: &str,
        opts: BlockOptions,
    ) -> VmResult<()> {
        let mut ast = parse_seq(&mut source.chars(), false)?;
        if opts.contains(BlockOptions::ACCELERATE) {
            collapse_accels(&mut ast);
        }
        let built = self.lower_ops(r, &ast).and_then(|()| {
            self.reserve(2 * CELL)?;
            let ops = self.tmp_pop(r);
            let bk = self.alloc_obj2(hdr(ObjTag::Block, 0), ops);
            self.intro_value(r, bk);
            Ok(())
        });
        if built.is_err() {
            // Abandon partial structure; the collector reclaims it.
            self.regs_mut(r).tmp = Val::UNIT_INR;
        }
        built
    }
}

impl<S> Context<S> {
    /// `e → ([a→b] * e)`: parse bytecode text into a block value.
    pub fn intro_block(&mut self, source: &str, opts: BlockOptions) -> VmResult<()> {
        let slot = self.slot();
        self.lock()
            .guarded(slot, |sp, r| sp.intro_block(r, source, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> VmResult<Vec<Ast>> {
        let mut ast = parse_seq(&mut src.chars(), false)?;
        collapse_accels(&mut ast);
        Ok(ast)
    }

    #[test]
    fn parses_primitives() {
        let ast = parse("#7+").expect("parse");
        assert_eq!(
            ast,
            vec![
                Ast::Op(Opcode::IntroNum),
                Ast::Op(Opcode::D7),
                Ast::Op(Opcode::Add)
            ]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("x").is_err());
        assert!(parse("[").is_err());
        assert!(parse("]").is_err());
        assert!(parse("{unterminated").is_err());
    }

    #[test]
    fn collapses_swap_and_longest_wins() {
        assert_eq!(parse("vrwlc").expect("parse"), vec![Ast::Op(Opcode::ProdSwap)]);
        assert_eq!(
            parse("vvrwlc").expect("parse"),
            vec![Ast::Op(Opcode::IntroUnitL)]
        );
        assert_eq!(
            parse("VRWLC").expect("parse"),
            vec![Ast::Op(Opcode::SumSwap)]
        );
        assert_eq!(parse("vr$c").expect("parse"), vec![Ast::Op(Opcode::Inline)]);
    }

    #[test]
    fn tailcall_only_at_end() {
        assert_eq!(
            parse("$c").expect("parse"),
            vec![Ast::Op(Opcode::TailCall)]
        );
        let mid = parse("$cw").expect("parse");
        assert_eq!(
            mid,
            vec![
                Ast::Op(Opcode::Apply),
                Ast::Op(Opcode::ElimUnit),
                Ast::Op(Opcode::SwapW)
            ]
        );
    }

    #[test]
    fn nested_blocks_collapse_independently() {
        let ast = parse("[vrwlc]").expect("parse");
        assert_eq!(ast, vec![Ast::Block(vec![Ast::Op(Opcode::ProdSwap)])]);
    }

    #[test]
    fn annotations_lower_or_drop() {
        assert_eq!(
            parse("{&lazy}").expect("parse"),
            vec![Ast::Op(Opcode::AnnoLazy)]
        );
        assert_eq!(parse("{&nonsense}").expect("parse"), vec![]);
    }

    #[test]
    fn sealers_become_tokens() {
        let ast = parse("{:map}").expect("parse");
        match &ast[..] {
            [Ast::Tok(t)] => assert_eq!(t.as_str(), ":map"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_literals_with_continuation() {
        let ast = parse("\"hello\n world\n~").expect("parse");
        assert_eq!(ast, vec![Ast::Text("hello\nworld".into())]);
        assert!(parse("\"unterminated").is_err());
        assert!(parse("\"bad\nx~").is_err());
    }
}
