use std::collections::HashMap;
use std::fmt;

use crate::ast::node::InstrNode;

/// Data types of the SCULL language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Char,
    String,
    Pointer,
    Void,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Type::Int => "int",
            Type::Char => "char",
            Type::String => "string",
            Type::Pointer => "ptr",
            Type::Void => "void",
        };
        write!(f, "{}", repr)
    }
}

/// Shape of a declared array: one folded size per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayShape {
    pub dimension_sizes: Vec<usize>,
}

impl ArrayShape {
    /// Total number of element slots the array occupies.
    pub fn slot_count(&self) -> usize {
        self.dimension_sizes.iter().product()
    }
}

/// A declared variable, as recorded in a scope's symbol table.
#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: Type,
    pub name: String,
    pub line: usize,
    /// Abstract slot index assigned by the semantic analyzer. The backend
    /// addresses locals through this without re-walking the tree.
    pub stack_offset: usize,
    pub array: Option<ArrayShape>,
}

/// String-keyed table of variables for one scope.
///
/// Values are copied in on insert and the first declaration of a name wins;
/// later declarations of the same name are silently ignored.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, Variable>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already declared.
    pub fn declare(&mut self, var: Variable) {
        self.vars.entry(var.name.clone()).or_insert(var);
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Declared,
    Defined,
}

/// A function signature plus, for definitions, its locals and body.
#[derive(Debug)]
pub struct Function<'a> {
    pub name: String,
    pub kind: FnKind,
    pub params: Vec<Variable>,
    pub return_types: Vec<Type>,
    pub is_variadic: bool,
    /// Body instructions for defined functions (arena-backed slice).
    pub body: Option<&'a [InstrNode<'a>]>,
    /// Locals including parameters, populated by the per-function pass.
    pub locals: SymbolTable,
}

/// Per-file table of declared and defined functions.
#[derive(Debug, Default)]
pub struct FnTable<'a> {
    fns: HashMap<String, Function<'a>>,
}

impl<'a> FnTable<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, f: Function<'a>) {
        self.fns.insert(f.name.clone(), f);
    }

    pub fn lookup(&self, name: &str) -> Option<&Function<'a>> {
        self.fns.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Function<'a>> {
        self.fns.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function<'a>> {
        self.fns.values()
    }
}
