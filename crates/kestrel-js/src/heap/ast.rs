//! Abstract Syntax Tree
//!
//! Flat node arena produced by the parser. Functions keep an `Rc<Ast>` plus
//! the id of their body, so closures never copy syntax.

use std::rc::Rc;

/// AST Node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Abstract Syntax Tree container
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// AST Node kinds
#[derive(Debug, Clone)]
pub enum Node {
    // Statements
    Program { body: Vec<NodeId> },
    Expression { expr: NodeId },
    Block { body: Vec<NodeId> },
    Empty,
    Var { declarations: Vec<(Box<str>, Option<NodeId>)> },
    FunctionDecl { name: Box<str>, params: Rc<[Box<str>]>, body: NodeId },
    If { test: NodeId, consequent: NodeId, alternate: Option<NodeId> },
    While { test: NodeId, body: NodeId },
    For { init: Option<NodeId>, test: Option<NodeId>, update: Option<NodeId>, body: NodeId },
    Return { argument: Option<NodeId> },
    Try { block: NodeId, param: Option<Box<str>>, handler: NodeId },

    // Expressions
    Number(f64),
    String(Box<str>),
    Bool(bool),
    Null,
    Undefined,
    This,
    Identifier(Box<str>),
    Object { properties: Vec<(Box<str>, NodeId)> },
    Function { name: Option<Box<str>>, params: Rc<[Box<str>]>, body: NodeId },
    Unary { op: UnaryOp, argument: NodeId },
    Update { op: UpdateOp, prefix: bool, target: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    Logical { op: LogicalOp, left: NodeId, right: NodeId },
    Conditional { test: NodeId, consequent: NodeId, alternate: NodeId },
    Assign { op: AssignOp, target: NodeId, value: NodeId },
    Member { object: NodeId, property: Box<str> },
    Index { object: NodeId, index: NodeId },
    Call { callee: NodeId, arguments: Vec<NodeId> },
    New { callee: NodeId, arguments: Vec<NodeId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}
