//! Interned type pool.
//!
//! The optimizer only needs a handful of facts about types: whether a value
//! carries a reference count at all ("trivial" types do not), which field of a
//! struct or tuple holds the only reference, and which enum cases carry a
//! payload. [`TypePool`] interns [`TypeData`] to [`Ty`] handles and computes
//! triviality once, at intern time, so the queries are O(1).

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::Ty;

/// One case of an enum type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumCase {
    pub name: String,
    /// `None` for a no-payload case.
    pub payload: Option<Ty>,
}

/// Structural description of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    /// Plain data with no references: integers, floats, raw pointers.
    Trivial(String),
    /// Reference to a heap object with a strong reference count.
    Class(String),
    /// Heap box holding a single value of the given type.
    Box(Ty),
    /// Thick function value; carries a reference-counted context.
    Function,
    Struct { name: String, fields: Vec<Ty> },
    Tuple(Vec<Ty>),
    Enum { name: String, cases: Vec<EnumCase> },
    /// Address of a value of the given type.
    ///
    /// Addresses are not reference counted themselves.
    Address(Ty),
}

/// Interning pool for [`TypeData`].
#[derive(Clone, Debug, Default)]
pub struct TypePool {
    types: Vec<TypeData>,
    trivial: Vec<bool>,
    map: FxHashMap<TypeData, Ty>,
}

impl TypePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing handle for structurally equal data.
    pub fn intern(&mut self, data: TypeData) -> Ty {
        if let Some(&ty) = self.map.get(&data) {
            return ty;
        }
        let trivial = self.compute_trivial(&data);
        let ty = Ty::from_len(self.types.len());
        self.types.push(data.clone());
        self.trivial.push(trivial);
        self.map.insert(data, ty);
        ty
    }

    fn compute_trivial(&self, data: &TypeData) -> bool {
        match data {
            TypeData::Trivial(_) | TypeData::Address(_) => true,
            TypeData::Class(_) | TypeData::Box(_) | TypeData::Function => false,
            TypeData::Struct { fields, .. } | TypeData::Tuple(fields) => {
                fields.iter().all(|&f| self.is_trivial(f))
            }
            TypeData::Enum { cases, .. } => cases
                .iter()
                .filter_map(|c| c.payload)
                .all(|p| self.is_trivial(p)),
        }
    }

    // ── Convenience constructors ────────────────────────────────────

    pub fn trivial(&mut self, name: &str) -> Ty {
        self.intern(TypeData::Trivial(name.to_owned()))
    }

    pub fn class(&mut self, name: &str) -> Ty {
        self.intern(TypeData::Class(name.to_owned()))
    }

    pub fn boxed(&mut self, inner: Ty) -> Ty {
        self.intern(TypeData::Box(inner))
    }

    pub fn function(&mut self) -> Ty {
        self.intern(TypeData::Function)
    }

    pub fn struct_type(&mut self, name: &str, fields: Vec<Ty>) -> Ty {
        self.intern(TypeData::Struct {
            name: name.to_owned(),
            fields,
        })
    }

    pub fn tuple(&mut self, elements: Vec<Ty>) -> Ty {
        self.intern(TypeData::Tuple(elements))
    }

    /// Intern an enum from `(case name, payload)` pairs.
    pub fn enum_type(&mut self, name: &str, cases: &[(&str, Option<Ty>)]) -> Ty {
        let cases = cases
            .iter()
            .map(|&(case, payload)| EnumCase {
                name: case.to_owned(),
                payload,
            })
            .collect();
        self.intern(TypeData::Enum {
            name: name.to_owned(),
            cases,
        })
    }

    pub fn address(&mut self, pointee: Ty) -> Ty {
        self.intern(TypeData::Address(pointee))
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Look up the structure of a type.
    ///
    /// # Panics
    ///
    /// Panics if `ty` was not issued by this pool.
    #[inline]
    pub fn get(&self, ty: Ty) -> &TypeData {
        &self.types[ty.index()]
    }

    /// `true` if values of this type never need reference counting.
    #[inline]
    pub fn is_trivial(&self, ty: Ty) -> bool {
        self.trivial[ty.index()]
    }

    #[inline]
    pub fn is_address(&self, ty: Ty) -> bool {
        matches!(self.get(ty), TypeData::Address(_))
    }

    /// Pointee of an address type.
    pub fn pointee(&self, ty: Ty) -> Option<Ty> {
        match self.get(ty) {
            TypeData::Address(inner) => Some(*inner),
            _ => None,
        }
    }

    /// Field types of a struct or element types of a tuple.
    pub fn fields(&self, ty: Ty) -> Option<&[Ty]> {
        match self.get(ty) {
            TypeData::Struct { fields, .. } | TypeData::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    /// Index of the only non-trivial field of a struct or tuple.
    ///
    /// Returns `None` if the type is not an aggregate or has zero or more
    /// than one non-trivial field.
    pub fn single_non_trivial_field(&self, ty: Ty) -> Option<usize> {
        let fields = self.fields(ty)?;
        let non_trivial: SmallVec<[usize; 2]> = fields
            .iter()
            .enumerate()
            .filter(|&(_, &f)| !self.is_trivial(f))
            .map(|(i, _)| i)
            .take(2)
            .collect();
        match non_trivial.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Cases of an enum type.
    pub fn enum_cases(&self, ty: Ty) -> Option<&[EnumCase]> {
        match self.get(ty) {
            TypeData::Enum { cases, .. } => Some(cases),
            _ => None,
        }
    }

    /// Payload type of enum case `case`, if the case has one.
    pub fn case_payload(&self, ty: Ty, case: u32) -> Option<Ty> {
        self.enum_cases(ty)?.get(case as usize)?.payload
    }

    /// Human-readable spelling used by the printer.
    pub fn display_name(&self, ty: Ty) -> String {
        match self.get(ty) {
            TypeData::Trivial(name) | TypeData::Class(name) => name.clone(),
            TypeData::Struct { name, .. } | TypeData::Enum { name, .. } => name.clone(),
            TypeData::Box(inner) => format!("box<{}>", self.display_name(*inner)),
            TypeData::Function => "fn".to_owned(),
            TypeData::Tuple(elems) => {
                let parts: Vec<String> = elems.iter().map(|&e| self.display_name(e)).collect();
                format!("({})", parts.join(", "))
            }
            TypeData::Address(inner) => format!("*{}", self.display_name(*inner)),
        }
    }
}
