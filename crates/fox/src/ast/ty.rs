//! The type lattice (spec §3.2): sealed, interned per [`AstContext`](super::AstContext).

use ahash::AHashMap;
use smallvec::SmallVec;

/// A handle to an interned [`TypeKind`]. Two `TypeId`s compare equal iff `unify` has bound them
/// to the same representative, or they were interned from the same structural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    fn from_index(i: usize) -> Self {
        Self(u32::try_from(i).expect("type table overflow"))
    }
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A one-shot inference variable. Identity-uniqued (never structurally deduplicated): each
/// `new_cell` call returns a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u32);

impl CellId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The six primitive scalar kinds from spec §3.1/§3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum PrimKind {
    Void,
    Bool,
    Int,
    Double,
    Char,
    String,
}

impl PrimKind {
    /// Integer rank used by `highestRank`: `bool=1, int=2, double=3` (spec §4.2).
    #[must_use]
    pub fn arith_rank(self) -> Option<u8> {
        match self {
            Self::Bool => Some(1),
            Self::Int => Some(2),
            Self::Double => Some(3),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_concat_compatible(self) -> bool {
        matches!(self, Self::String | Self::Char)
    }
}

/// The shape of a type. `Array`/`LValue`/`Function` recurse through interned `TypeId`s rather
/// than owning their operands directly, so structural equality is a key lookup, not a deep
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive(PrimKind),
    /// Ordered homogeneous collection of the element type.
    Array(TypeId),
    /// An assignable reference; only ever produced during typing, never written by the parser.
    LValue(TypeId),
    Function(SmallVec<[TypeId; 4]>, TypeId),
    /// Inference variable, `None` while unbound.
    Cell(CellId),
    /// Propagates inference failure silently; never itself reported as a diagnostic argument.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Primitive(PrimKind),
    Array(TypeId),
    LValue(TypeId),
    Function(SmallVec<[TypeId; 4]>, TypeId),
}

/// Owns the interned type table and the cell-binding table for one [`AstContext`](super::AstContext).
#[derive(Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    uniquing: AHashMap<TypeKey, TypeId>,
    cells: Vec<Option<TypeId>>,
    error_type: Option<TypeId>,
}

impl TypeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern_keyed(&mut self, key: TypeKey, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.uniquing.get(&key) {
            return id;
        }
        let id = TypeId::from_index(self.kinds.len());
        self.kinds.push(kind);
        self.uniquing.insert(key, id);
        id
    }

    #[must_use]
    pub fn primitive(&mut self, p: PrimKind) -> TypeId {
        self.intern_keyed(TypeKey::Primitive(p), TypeKind::Primitive(p))
    }

    #[must_use]
    pub fn array(&mut self, elem: TypeId) -> TypeId {
        self.intern_keyed(TypeKey::Array(elem), TypeKind::Array(elem))
    }

    /// Wraps `pointee` in an lvalue. Spec §3.2: lvalues are never nested in arrays or functions,
    /// so callers must not pass an already-lvalue or composite-containing-lvalue type here; this
    /// is enforced by construction (sema only calls this on the result of `decl.type`, which is
    /// never itself an lvalue).
    #[must_use]
    pub fn lvalue(&mut self, pointee: TypeId) -> TypeId {
        self.intern_keyed(TypeKey::LValue(pointee), TypeKind::LValue(pointee))
    }

    #[must_use]
    pub fn function(&mut self, params: SmallVec<[TypeId; 4]>, ret: TypeId) -> TypeId {
        self.intern_keyed(TypeKey::Function(params.clone(), ret), TypeKind::Function(params, ret))
    }

    /// Allocates a fresh, unbound inference cell.
    #[must_use]
    pub fn new_cell(&mut self) -> TypeId {
        let id = CellId(u32::try_from(self.cells.len()).expect("too many cells"));
        self.cells.push(None);
        let ty_id = TypeId::from_index(self.kinds.len());
        self.kinds.push(TypeKind::Cell(id));
        ty_id
    }

    #[must_use]
    pub fn error(&mut self) -> TypeId {
        if let Some(id) = self.error_type {
            return id;
        }
        let id = TypeId::from_index(self.kinds.len());
        self.kinds.push(TypeKind::Error);
        self.error_type = Some(id);
        id
    }

    #[must_use]
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index()]
    }

    /// Follows cell bindings through to a bound type or a free cell; never follows through
    /// `Array`/`Function`/`LValue` structure.
    #[must_use]
    pub fn resolve_cells(&self, mut id: TypeId) -> TypeId {
        loop {
            match self.kind(id) {
                TypeKind::Cell(cell) => match self.cells[cell.index()] {
                    Some(bound) => id = bound,
                    None => return id,
                },
                _ => return id,
            }
        }
    }

    /// Binds a free cell to `ty`. Binding is final: rebinding an already-bound cell is a
    /// programmer-fatal internal error (spec §7) since `unify` never rebinds.
    pub fn bind_cell(&mut self, id: TypeId, ty: TypeId) {
        let TypeKind::Cell(cell) = self.kind(id) else {
            unreachable!("bind_cell called on a non-cell type");
        };
        let cell = *cell;
        assert!(self.cells[cell.index()].is_none(), "cells are bound exactly once");
        self.cells[cell.index()] = Some(ty);
    }

    /// Structural equality check used by `unify` once both sides are cell-resolved non-cell
    /// types: same kind, same arguments (recursively, via `TypeId` equality since those are
    /// themselves already-uniqued or already-resolved operands).
    #[must_use]
    pub fn structurally_equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Primitive(p1), TypeKind::Primitive(p2)) => p1 == p2,
            (TypeKind::Array(e1), TypeKind::Array(e2)) => self.structurally_equal(*e1, *e2),
            (TypeKind::LValue(e1), TypeKind::LValue(e2)) => self.structurally_equal(*e1, *e2),
            (TypeKind::Function(p1, r1), TypeKind::Function(p2, r2)) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(x, y)| self.structurally_equal(*x, *y))
                    && self.structurally_equal(*r1, *r2)
            }
            _ => false,
        }
    }

    /// Human-readable rendering for diagnostic arguments (`%0`/`%1` substitution).
    #[must_use]
    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Primitive(p) => p.to_string(),
            TypeKind::Array(e) => format!("[{}]", self.display(*e)),
            TypeKind::LValue(e) => self.display(*e),
            TypeKind::Function(params, ret) => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("({}) -> {}", params.join(", "), self.display(*ret))
            }
            TypeKind::Cell(_) => "<inferred>".to_owned(),
            TypeKind::Error => "<error>".to_owned(),
        }
    }
}

/// Strips an outer `LValue`, if present; otherwise returns the type unchanged.
#[must_use]
pub fn strip_lvalue(table: &TypeTable, id: TypeId) -> TypeId {
    match table.kind(id) {
        TypeKind::LValue(inner) => *inner,
        _ => id,
    }
}

#[must_use]
pub fn is_lvalue(table: &TypeTable, id: TypeId) -> bool {
    matches!(table.kind(id), TypeKind::LValue(_))
}

/// `unify(a, b)`: makes `a` and `b` equal by binding cells. Commutative, and recursive under
/// `Array`/`Function`. A cell bound to a non-cell is never rebound (spec §4.2: the occur-check
/// is unnecessary since cells can't self-reference in Fox).
pub fn unify(table: &mut TypeTable, a: TypeId, b: TypeId) -> bool {
    let a = table.resolve_cells(a);
    let b = table.resolve_cells(b);
    if a == b {
        return true;
    }
    if matches!(table.kind(a), TypeKind::Error) || matches!(table.kind(b), TypeKind::Error) {
        return true;
    }
    match (table.kind(a).clone(), table.kind(b).clone()) {
        (TypeKind::Cell(_), _) => {
            table.bind_cell(a, b);
            true
        }
        (_, TypeKind::Cell(_)) => {
            table.bind_cell(b, a);
            true
        }
        (TypeKind::Array(e1), TypeKind::Array(e2)) => unify(table, e1, e2),
        (TypeKind::LValue(e1), TypeKind::LValue(e2)) => unify(table, e1, e2),
        (TypeKind::Function(p1, r1), TypeKind::Function(p2, r2)) => {
            p1.len() == p2.len() && p1.iter().zip(p2.iter()).all(|(&x, &y)| unify(table, x, y)) && unify(table, r1, r2)
        }
        (TypeKind::Primitive(p1), TypeKind::Primitive(p2)) => p1 == p2,
        _ => false,
    }
}

/// Widest arithmetic type between `a` and `b`, by the `bool < int < double` ranking (spec
/// §4.2). Both must already be arithmetic primitives (caller's responsibility to check).
#[must_use]
pub fn highest_rank(table: &TypeTable, a: TypeId, b: TypeId) -> TypeId {
    let (TypeKind::Primitive(pa), TypeKind::Primitive(pb)) = (table.kind(a).clone(), table.kind(b).clone()) else {
        unreachable!("highest_rank called on non-primitive operands");
    };
    let ra = pa.arith_rank().expect("arithmetic operand");
    let rb = pb.arith_rank().expect("arithmetic operand");
    if ra >= rb { a } else { b }
}

/// A parsed (unresolved) type expression, from the `type` grammar production. Resolved into a
/// [`TypeId`] by the semantic analyser.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Primitive(PrimKind),
    Array(Box<TypeExpr>),
}

impl TypeExpr {
    #[must_use]
    pub fn resolve(&self, table: &mut TypeTable) -> TypeId {
        match self {
            Self::Primitive(p) => table.primitive(*p),
            Self::Array(inner) => {
                let elem = inner.resolve(table);
                table.array(elem)
            }
        }
    }
}

