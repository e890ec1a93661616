//! Instruction emission and the container serializer (§4.4).
//!
//! [`InstrWriter`] is the low-level byte emitter [`crate::regalloc`] drives
//! one MIR instruction at a time; [`encode`] wraps a finished [`Module`]
//! into the on-disk container (name/constant/function/instruction
//! sections behind the four-offset header).

use super::{Constant, FunctionRecord, Module, Opcode, MAGIC};

/// A fixed-size argument-binding slot in a `CallR` instruction's operand
/// list (§4.5 call protocol): positional args carry no name, named args
/// do.
pub enum CallArgKind {
    Positional,
    Named(u16),
}

/// Appends one instruction's bytes at a time. Every `emit_*` method
/// returns the byte offset the instruction started at, so callers that
/// need to patch a jump target later (§4.3: "jumps are patched with
/// absolute offsets at assembly time") can record it.
#[derive(Debug, Default)]
pub struct InstrWriter {
    pub code: Vec<u8>,
}

impl InstrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    fn op(&mut self, op: Opcode) -> u32 {
        let pos = self.position();
        self.code.push(op as u8);
        pos
    }

    fn u8(&mut self, v: u8) {
        self.code.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    pub fn load_const(&mut self, dst: u8, const_idx: u16) -> u32 {
        let pos = self.op(Opcode::LoadConstR);
        self.u8(dst);
        self.u16(const_idx);
        pos
    }

    pub fn copy(&mut self, dst: u8, src: u8) -> u32 {
        let pos = self.op(Opcode::CopyR);
        self.u8(dst);
        self.u8(src);
        pos
    }

    pub fn load_name(&mut self, dst: u8, name_idx: u16) -> u32 {
        let pos = self.op(Opcode::LoadNameR);
        self.u8(dst);
        self.u16(name_idx);
        pos
    }

    pub fn store_name(&mut self, name_idx: u16, src: u8) -> u32 {
        let pos = self.op(Opcode::StoreNameR);
        self.u16(name_idx);
        self.u8(src);
        pos
    }

    fn binop(&mut self, op: Opcode, dst: u8, lhs: u8, rhs: u8) -> u32 {
        let pos = self.op(op);
        self.u8(dst);
        self.u8(lhs);
        self.u8(rhs);
        pos
    }

    pub fn add(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::AddR, dst, lhs, rhs)
    }
    pub fn sub(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::SubR, dst, lhs, rhs)
    }
    pub fn mul(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::MulR, dst, lhs, rhs)
    }
    pub fn div(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::DivR, dst, lhs, rhs)
    }
    pub fn eq(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::EqR, dst, lhs, rhs)
    }
    pub fn strict_eq(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::StrictEqR, dst, lhs, rhs)
    }
    pub fn strict_ne(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::StrictNeR, dst, lhs, rhs)
    }
    pub fn lt(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::LtR, dst, lhs, rhs)
    }
    pub fn le(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::LeR, dst, lhs, rhs)
    }
    pub fn gt(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::GtR, dst, lhs, rhs)
    }
    pub fn ge(&mut self, dst: u8, lhs: u8, rhs: u8) -> u32 {
        self.binop(Opcode::GeR, dst, lhs, rhs)
    }

    pub fn neg(&mut self, dst: u8, src: u8) -> u32 {
        let pos = self.op(Opcode::NegR);
        self.u8(dst);
        self.u8(src);
        pos
    }

    pub fn not(&mut self, dst: u8, src: u8) -> u32 {
        let pos = self.op(Opcode::NotR);
        self.u8(dst);
        self.u8(src);
        pos
    }

    /// Emits the target as `0`; callers patch it once the destination
    /// block's offset is known (§4.3).
    pub fn jump(&mut self) -> u32 {
        let pos = self.op(Opcode::JumpR);
        self.i32(0);
        pos
    }

    pub fn branch_if_true(&mut self, cond: u8) -> u32 {
        let pos = self.op(Opcode::BranchIfTrueR);
        self.u8(cond);
        self.i32(0);
        pos
    }

    pub fn branch_if_false(&mut self, cond: u8) -> u32 {
        let pos = self.op(Opcode::BranchIfFalseR);
        self.u8(cond);
        self.i32(0);
        pos
    }

    /// Patches the 4-byte absolute target at `instr_pos + header_len`
    /// (the byte right after the opcode and any leading operand bytes).
    pub fn patch_target(&mut self, operand_offset: usize, target: u32) {
        let bytes = (target as i32).to_le_bytes();
        self.code[operand_offset..operand_offset + 4].copy_from_slice(&bytes);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn call(
        &mut self,
        dst: Option<u8>,
        fn_idx: u16,
        args: &[(CallArgKind, u8)],
    ) -> u32 {
        let pos = self.op(Opcode::CallR);
        self.u8(dst.is_some() as u8);
        self.u8(dst.unwrap_or(0));
        self.u16(fn_idx);
        self.u8(args.len() as u8);
        for (kind, reg) in args {
            match kind {
                CallArgKind::Positional => {
                    self.u8(0);
                    self.u16(0xFFFF);
                }
                CallArgKind::Named(name_idx) => {
                    self.u8(1);
                    self.u16(*name_idx);
                }
            }
            self.u8(*reg);
        }
        pos
    }

    pub fn say(&mut self, src: u8) -> u32 {
        let pos = self.op(Opcode::SayR);
        self.u8(src);
        pos
    }

    pub fn new_list(&mut self, dst: u8, elem_ty_tag: u8) -> u32 {
        let pos = self.op(Opcode::NewListR);
        self.u8(dst);
        self.u8(elem_ty_tag);
        pos
    }

    pub fn new_dict(&mut self, dst: u8) -> u32 {
        let pos = self.op(Opcode::NewDictR);
        self.u8(dst);
        pos
    }

    pub fn list_append(&mut self, list: u8, value: u8) -> u32 {
        let pos = self.op(Opcode::ListAppendR);
        self.u8(list);
        self.u8(value);
        pos
    }

    pub fn list_set(&mut self, list: u8, index: u8, value: u8) -> u32 {
        let pos = self.op(Opcode::ListSetR);
        self.u8(list);
        self.u8(index);
        self.u8(value);
        pos
    }

    pub fn list_get(&mut self, dst: u8, list: u8, index: u8) -> u32 {
        let pos = self.op(Opcode::ListGetR);
        self.u8(dst);
        self.u8(list);
        self.u8(index);
        pos
    }

    pub fn list_insert(&mut self, list: u8, index: u8, value: u8) -> u32 {
        let pos = self.op(Opcode::ListInsertR);
        self.u8(list);
        self.u8(index);
        self.u8(value);
        pos
    }

    pub fn list_remove(&mut self, list: u8, value: u8) -> u32 {
        let pos = self.op(Opcode::ListRemoveR);
        self.u8(list);
        self.u8(value);
        pos
    }

    pub fn list_len(&mut self, dst: u8, list: u8) -> u32 {
        let pos = self.op(Opcode::ListLenR);
        self.u8(dst);
        self.u8(list);
        pos
    }

    pub fn dict_set(&mut self, dict: u8, key: u8, value: u8) -> u32 {
        let pos = self.op(Opcode::DictSetR);
        self.u8(dict);
        self.u8(key);
        self.u8(value);
        pos
    }

    pub fn dict_get(&mut self, dst: u8, dict: u8, key: u8) -> u32 {
        let pos = self.op(Opcode::DictGetR);
        self.u8(dst);
        self.u8(dict);
        self.u8(key);
        pos
    }

    pub fn ret(&mut self, src: Option<u8>) -> u32 {
        let pos = self.op(Opcode::ReturnR);
        self.u8(src.is_some() as u8);
        self.u8(src.unwrap_or(0));
        pos
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Serializes a fully assembled [`Module`] into the `.mdbc` container
/// (§4.4): header, name section, constant pool, function table, then the
/// flat instruction stream.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut name_section = Vec::new();
    put_u32(&mut name_section, module.name.len() as u32);
    name_section.extend_from_slice(module.name.as_bytes());

    let mut const_section = Vec::new();
    put_u32(&mut const_section, module.constants.len() as u32);
    for c in &module.constants {
        encode_constant(&mut const_section, c);
    }

    let mut func_section = Vec::new();
    put_u32(&mut func_section, module.functions.len() as u32);
    for f in &module.functions {
        encode_function(&mut func_section, f);
    }

    let mut inst_section = Vec::new();
    put_u32(&mut inst_section, module.code.len() as u32);
    inst_section.extend_from_slice(&module.top_level_register_count.to_le_bytes());
    inst_section.extend_from_slice(&module.code);

    const HEADER_LEN: u32 = 4 + 4 + 4 + 4 + 4 + 4 + 4;
    let name_offset = HEADER_LEN;
    let const_offset = name_offset + name_section.len() as u32;
    let func_offset = const_offset + const_section.len() as u32;
    let inst_offset = func_offset + func_section.len() as u32;

    let mut out = Vec::with_capacity(inst_offset as usize + inst_section.len());
    out.extend_from_slice(&MAGIC);
    put_u32(&mut out, module.version);
    put_u32(&mut out, module.flags);
    put_u32(&mut out, name_offset);
    put_u32(&mut out, const_offset);
    put_u32(&mut out, func_offset);
    put_u32(&mut out, inst_offset);
    out.extend_from_slice(&name_section);
    out.extend_from_slice(&const_section);
    out.extend_from_slice(&func_section);
    out.extend_from_slice(&inst_section);
    out
}

fn encode_constant(out: &mut Vec<u8>, c: &Constant) {
    match c {
        Constant::Empty => out.push(0),
        Constant::Integer(n) => {
            out.push(1);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Constant::Float(x) => {
            out.push(2);
            out.extend_from_slice(&x.to_le_bytes());
        }
        Constant::String(s) => {
            out.push(3);
            put_u32(out, s.len() as u32);
            out.extend_from_slice(s.as_bytes());
        }
        Constant::Boolean(b) => {
            out.push(4);
            out.push(*b as u8);
        }
    }
}

fn encode_function(out: &mut Vec<u8>, f: &FunctionRecord) {
    put_u32(out, f.name.len() as u32);
    out.extend_from_slice(f.name.as_bytes());
    out.push(f.params.len() as u8);
    for p in &f.params {
        put_u32(out, p.name.len() as u32);
        out.extend_from_slice(p.name.as_bytes());
        out.push(p.required as u8);
        match p.default_fn {
            Some(idx) => {
                out.push(1);
                put_u32(out, idx);
            }
            None => out.push(0),
        }
    }
    out.push(f.output_ty as u8);
    out.extend_from_slice(&f.register_count.to_le_bytes());
    put_u32(out, f.entry_offset);
}
