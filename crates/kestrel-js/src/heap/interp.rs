//! Evaluator
//!
//! Tree-walking interpreter over [`Ast`]. Variables live in scope objects on
//! the heap so closures keep them reachable; the global scope is the global
//! object itself.

use std::rc::Rc;

use super::ast::{AssignOp, Ast, BinaryOp, LogicalOp, Node, NodeId, UnaryOp, UpdateOp};
use super::{HeapEngine, HeapValue, ObjectId, ObjectKind, Property};
use crate::engine::ScriptEngine;
use crate::error::ScriptError;
use crate::value::ScriptValue;

/// Evaluation frame
struct Frame {
    ast: Rc<Ast>,
    /// Innermost scope object; `None` is the global scope
    scope: Option<ObjectId>,
    this: HeapValue,
}

/// Statement completion. `Normal(None)` is an empty completion.
enum Completion {
    Normal(Option<HeapValue>),
    Return(HeapValue),
}

/// Assignment target
enum Target {
    Variable(Box<str>),
    Property(ObjectId, String),
    /// Write to a primitive; reads still work, writes are dropped
    Primitive(HeapValue, String),
}

fn node(frame: &Frame, id: NodeId) -> Result<&Node, ScriptError> {
    frame.ast.get(id).ok_or_else(|| ScriptError::internal(format!("dangling syntax node {}", id.0)))
}

fn strict_equals(a: &HeapValue, b: &HeapValue) -> bool {
    match (a, b) {
        (ScriptValue::Undefined, ScriptValue::Undefined) | (ScriptValue::Null, ScriptValue::Null) => true,
        (ScriptValue::Bool(x), ScriptValue::Bool(y)) => x == y,
        (ScriptValue::Number(x), ScriptValue::Number(y)) => x == y,
        (ScriptValue::String(x), ScriptValue::String(y)) => x == y,
        (ScriptValue::Object(x), ScriptValue::Object(y)) => x == y,
        _ => false,
    }
}

fn same_type(a: &HeapValue, b: &HeapValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn string_property(s: &str, name: &str) -> HeapValue {
    if name == "length" {
        return ScriptValue::from(s.chars().count());
    }
    match name.parse::<usize>() {
        Ok(index) => s.chars().nth(index).map_or(ScriptValue::Undefined, |c| ScriptValue::String(c.to_string())),
        Err(_) => ScriptValue::Undefined,
    }
}

impl HeapEngine {
    pub(super) fn run_program(&mut self, ast: Rc<Ast>) -> Result<HeapValue, ScriptError> {
        let root = ast.root().ok_or_else(|| ScriptError::internal("program without root"))?;
        let frame = Frame { ast, scope: None, this: ScriptValue::Object(self.global) };
        let Node::Program { body } = node(&frame, root)? else {
            return Err(ScriptError::internal("root is not a program"));
        };

        self.depth += 1;
        let result = self.hoist(&frame, body).and_then(|()| self.exec_list(&frame, body));
        self.depth -= 1;

        match result? {
            Completion::Normal(value) => Ok(value.unwrap_or_default()),
            Completion::Return(value) => Ok(value),
        }
    }

    pub(super) fn call_function(
        &mut self,
        function: &HeapValue,
        this: &HeapValue,
        args: &[HeapValue],
    ) -> Result<HeapValue, ScriptError> {
        let ScriptValue::Object(id) = function else {
            return Err(ScriptError::type_error("value is not a function"));
        };
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::range_error("maximum call stack size exceeded"));
        }

        match &self.object(*id)?.kind {
            ObjectKind::Native { function, .. } => {
                let function = function.clone();
                self.depth += 1;
                let result = function(self, this, args);
                self.depth -= 1;
                result
            }
            ObjectKind::Closure { ast, params, body, scope, .. } => {
                let (ast, params, body, parent) = (ast.clone(), params.clone(), *body, *scope);
                self.depth += 1;
                let result = self.run_closure(ast, &params, body, parent, this, args);
                self.depth -= 1;
                result
            }
            _ => Err(ScriptError::type_error("value is not a function")),
        }
    }

    fn run_closure(
        &mut self,
        ast: Rc<Ast>,
        params: &[Box<str>],
        body: NodeId,
        parent: Option<ObjectId>,
        this: &HeapValue,
        args: &[HeapValue],
    ) -> Result<HeapValue, ScriptError> {
        let scope = self.alloc(ObjectKind::Scope { parent })?;
        for (i, param) in params.iter().enumerate() {
            self.define_data(scope, param, args.get(i).cloned().unwrap_or_default())?;
        }
        let this = if this.is_nullish() { ScriptValue::Object(self.global) } else { this.clone() };
        let frame = Frame { ast, scope: Some(scope), this };

        let statements = match node(&frame, body)? {
            Node::Block { body } => body,
            _ => return Err(ScriptError::internal("function body is not a block")),
        };
        self.hoist(&frame, statements)?;
        match self.exec_list(&frame, statements)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal(_) => Ok(ScriptValue::Undefined),
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn hoist(&mut self, frame: &Frame, statements: &[NodeId]) -> Result<(), ScriptError> {
        for id in statements {
            self.hoist_statement(frame, *id)?;
        }
        Ok(())
    }

    fn hoist_statement(&mut self, frame: &Frame, id: NodeId) -> Result<(), ScriptError> {
        match node(frame, id)? {
            Node::Var { declarations } => {
                for (name, _) in declarations {
                    self.declare(frame, name)?;
                }
            }
            Node::FunctionDecl { name, params, body } => {
                let closure = self.make_closure(frame, Some(&**name), params, *body)?;
                self.declare(frame, name)?;
                self.assign_variable(frame, name, closure)?;
            }
            Node::Block { body } => self.hoist(frame, body)?,
            Node::If { consequent, alternate, .. } => {
                self.hoist_statement(frame, *consequent)?;
                if let Some(alternate) = alternate {
                    self.hoist_statement(frame, *alternate)?;
                }
            }
            Node::While { body, .. } => self.hoist_statement(frame, *body)?,
            Node::For { init, body, .. } => {
                if let Some(init) = init {
                    self.hoist_statement(frame, *init)?;
                }
                self.hoist_statement(frame, *body)?;
            }
            Node::Try { block, param, handler } => {
                self.hoist_statement(frame, *block)?;
                if let Some(param) = param {
                    self.declare(frame, param)?;
                }
                self.hoist_statement(frame, *handler)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Create the binding in the innermost scope unless it exists
    fn declare(&mut self, frame: &Frame, name: &str) -> Result<(), ScriptError> {
        let target = frame.scope.unwrap_or(self.global);
        if !self.has_own(target, name) {
            self.define_data(target, name, ScriptValue::Undefined)?;
        }
        Ok(())
    }

    fn make_closure(
        &mut self,
        frame: &Frame,
        name: Option<&str>,
        params: &Rc<[Box<str>]>,
        body: NodeId,
    ) -> Result<HeapValue, ScriptError> {
        let id = self.alloc(ObjectKind::Closure {
            name: name.map(Into::into),
            ast: frame.ast.clone(),
            params: params.clone(),
            body,
            scope: frame.scope,
        })?;
        Ok(ScriptValue::Object(id))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_list(&mut self, frame: &Frame, statements: &[NodeId]) -> Result<Completion, ScriptError> {
        let mut last = None;
        for id in statements {
            match self.exec(frame, *id)? {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                ret @ Completion::Return(_) => return Ok(ret),
            }
        }
        Ok(Completion::Normal(last))
    }

    /// RangeError once evaluation recursed `max_eval_depth` levels
    fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        if self.nesting >= self.limits.max_eval_depth {
            return Err(ScriptError::range_error("maximum evaluation depth exceeded"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn exec(&mut self, frame: &Frame, id: NodeId) -> Result<Completion, ScriptError> {
        self.descend(|engine| engine.exec_node(frame, id))
    }

    fn exec_node(&mut self, frame: &Frame, id: NodeId) -> Result<Completion, ScriptError> {
        match node(frame, id)? {
            Node::Expression { expr } => Ok(Completion::Normal(Some(self.eval_expr(frame, *expr)?))),
            Node::Block { body } => self.exec_list(frame, body),
            Node::Empty | Node::FunctionDecl { .. } => Ok(Completion::Normal(None)),
            Node::Var { declarations } => {
                for (name, init) in declarations {
                    if let Some(init) = init {
                        let value = self.eval_expr(frame, *init)?;
                        self.assign_variable(frame, name, value)?;
                    }
                }
                Ok(Completion::Normal(None))
            }
            Node::If { test, consequent, alternate } => {
                if self.eval_expr(frame, *test)?.truthy() {
                    self.exec(frame, *consequent)
                } else if let Some(alternate) = alternate {
                    self.exec(frame, *alternate)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            Node::While { test, body } => {
                let mut last = None;
                while self.eval_expr(frame, *test)?.truthy() {
                    match self.exec(frame, *body)? {
                        Completion::Normal(value) => last = value.or(last),
                        ret => return Ok(ret),
                    }
                }
                Ok(Completion::Normal(last))
            }
            Node::For { init, test, update, body } => {
                if let Some(init) = init {
                    self.exec(frame, *init)?;
                }
                let mut last = None;
                loop {
                    if let Some(test) = test {
                        if !self.eval_expr(frame, *test)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(frame, *body)? {
                        Completion::Normal(value) => last = value.or(last),
                        ret => return Ok(ret),
                    }
                    if let Some(update) = update {
                        self.eval_expr(frame, *update)?;
                    }
                }
                Ok(Completion::Normal(last))
            }
            Node::Return { argument } => {
                let value = match argument {
                    Some(argument) => self.eval_expr(frame, *argument)?,
                    None => ScriptValue::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Node::Try { block, param, handler } => match self.exec(frame, *block) {
                Err(err) if err.is_catchable() => {
                    if let Some(param) = param {
                        let error = self.error_object(&err)?;
                        self.assign_variable(frame, param, error)?;
                    }
                    self.exec(frame, *handler)
                }
                other => other,
            },
            other => Err(ScriptError::internal(format!("unexpected statement {:?}", other))),
        }
    }

    fn error_object(&mut self, err: &ScriptError) -> Result<HeapValue, ScriptError> {
        let object = self.create_object()?;
        self.define_data(object, "name", ScriptValue::from(err.name()))?;
        self.define_data(object, "message", ScriptValue::from(err.message()))?;
        Ok(ScriptValue::Object(object))
    }

    // ========================================================================
    // Variables
    // ========================================================================

    fn lookup_variable(&mut self, frame: &Frame, name: &str) -> Result<HeapValue, ScriptError> {
        let mut scope = frame.scope;
        while let Some(id) = scope {
            let object = self.object(id)?;
            if let Some(Property::Data { value, .. }) = object.property(name) {
                return Ok(value.clone());
            }
            scope = match object.kind {
                ObjectKind::Scope { parent } => parent,
                _ => None,
            };
        }
        let global = self.global;
        if self.has_own(global, name) {
            return self.get(&global, name);
        }
        Err(ScriptError::Reference(format!("{} is not defined", name)))
    }

    fn assign_variable(&mut self, frame: &Frame, name: &str, value: HeapValue) -> Result<(), ScriptError> {
        let mut scope = frame.scope;
        while let Some(id) = scope {
            if self.has_own(id, name) {
                return self.define_data(id, name, value);
            }
            scope = match self.object(id)?.kind {
                ObjectKind::Scope { parent } => parent,
                _ => None,
            };
        }
        let global = self.global;
        self.set(&global, name, value)
    }

    fn resolve_target(&mut self, frame: &Frame, id: NodeId) -> Result<Target, ScriptError> {
        match node(frame, id)? {
            Node::Identifier(name) => Ok(Target::Variable(name.clone())),
            Node::Member { object, property } => {
                let base = self.eval_expr(frame, *object)?;
                self.property_target(base, property.to_string())
            }
            Node::Index { object, index } => {
                let base = self.eval_expr(frame, *object)?;
                let key = self.eval_expr(frame, *index)?;
                let key = ScriptEngine::to_string(self, &key)?;
                self.property_target(base, key)
            }
            _ => Err(ScriptError::Syntax("invalid assignment target".into())),
        }
    }

    fn property_target(&mut self, base: HeapValue, name: String) -> Result<Target, ScriptError> {
        match base {
            ScriptValue::Object(id) => Ok(Target::Property(id, name)),
            ScriptValue::Undefined | ScriptValue::Null => Err(ScriptError::type_error(format!(
                "cannot access property '{}' of {}",
                name,
                if base.is_null() { "null" } else { "undefined" }
            ))),
            other => Ok(Target::Primitive(other, name)),
        }
    }

    fn read_target(&mut self, frame: &Frame, target: &Target) -> Result<HeapValue, ScriptError> {
        match target {
            Target::Variable(name) => self.lookup_variable(frame, name),
            Target::Property(id, name) => self.get(id, name),
            Target::Primitive(value, name) => Ok(self.primitive_property(value, name)),
        }
    }

    fn write_target(&mut self, frame: &Frame, target: &Target, value: HeapValue) -> Result<(), ScriptError> {
        match target {
            Target::Variable(name) => self.assign_variable(frame, name, value),
            Target::Property(id, name) => self.set(id, name, value),
            Target::Primitive(..) => Ok(()),
        }
    }

    fn primitive_property(&self, value: &HeapValue, name: &str) -> HeapValue {
        match value {
            ScriptValue::String(s) => string_property(s, name),
            _ => ScriptValue::Undefined,
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval_expr(&mut self, frame: &Frame, id: NodeId) -> Result<HeapValue, ScriptError> {
        self.descend(|engine| engine.eval_node(frame, id))
    }

    fn eval_node(&mut self, frame: &Frame, id: NodeId) -> Result<HeapValue, ScriptError> {
        match node(frame, id)? {
            Node::Number(n) => Ok(ScriptValue::Number(*n)),
            Node::String(s) => Ok(ScriptValue::String(s.to_string())),
            Node::Bool(b) => Ok(ScriptValue::Bool(*b)),
            Node::Null => Ok(ScriptValue::Null),
            Node::Undefined => Ok(ScriptValue::Undefined),
            Node::This => Ok(frame.this.clone()),
            Node::Identifier(name) => self.lookup_variable(frame, name),
            Node::Object { properties } => {
                let object = self.create_object()?;
                for (name, value) in properties {
                    let value = self.eval_expr(frame, *value)?;
                    self.define_data(object, name, value)?;
                }
                Ok(ScriptValue::Object(object))
            }
            Node::Function { name, params, body } => self.make_closure(frame, name.as_deref(), params, *body),
            Node::Unary { op, argument } => self.eval_unary(frame, *op, *argument),
            Node::Update { op, prefix, target } => {
                let target = self.resolve_target(frame, *target)?;
                let old = self.read_target(frame, &target)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_target(frame, &target, ScriptValue::Number(new))?;
                Ok(ScriptValue::Number(if *prefix { new } else { old }))
            }
            Node::Binary { op, left, right } => {
                let left = self.eval_expr(frame, *left)?;
                let right = self.eval_expr(frame, *right)?;
                self.binary(*op, &left, &right)
            }
            Node::Logical { op, left, right } => {
                let left = self.eval_expr(frame, *left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval_expr(frame, *right),
                }
            }
            Node::Conditional { test, consequent, alternate } => {
                if self.eval_expr(frame, *test)?.truthy() {
                    self.eval_expr(frame, *consequent)
                } else {
                    self.eval_expr(frame, *alternate)
                }
            }
            Node::Assign { op, target, value } => {
                let target = self.resolve_target(frame, *target)?;
                let value = match op {
                    AssignOp::Assign => self.eval_expr(frame, *value)?,
                    AssignOp::AddAssign => {
                        let old = self.read_target(frame, &target)?;
                        let rhs = self.eval_expr(frame, *value)?;
                        self.binary(BinaryOp::Add, &old, &rhs)?
                    }
                    AssignOp::SubAssign => {
                        let old = self.read_target(frame, &target)?;
                        let rhs = self.eval_expr(frame, *value)?;
                        self.binary(BinaryOp::Sub, &old, &rhs)?
                    }
                };
                self.write_target(frame, &target, value.clone())?;
                Ok(value)
            }
            Node::Member { .. } | Node::Index { .. } => {
                let target = self.resolve_target(frame, id)?;
                self.read_target(frame, &target)
            }
            Node::Call { callee, arguments } => {
                let (function, this) = match node(frame, *callee)? {
                    Node::Member { .. } | Node::Index { .. } => {
                        let target = self.resolve_target(frame, *callee)?;
                        let function = self.read_target(frame, &target)?;
                        let this = match &target {
                            Target::Property(id, _) => ScriptValue::Object(*id),
                            Target::Primitive(value, _) => value.clone(),
                            Target::Variable(_) => ScriptValue::Undefined,
                        };
                        (function, this)
                    }
                    _ => (self.eval_expr(frame, *callee)?, ScriptValue::Undefined),
                };
                if !self.is_callable(&function) {
                    return Err(ScriptError::type_error(format!("{} is not a function", self.describe_callee(frame, *callee))));
                }
                let args = self.eval_arguments(frame, arguments)?;
                self.call_function(&function, &this, &args)
            }
            Node::New { callee, arguments } => {
                let function = self.eval_expr(frame, *callee)?;
                if !self.is_callable(&function) {
                    return Err(ScriptError::type_error(format!("{} is not a constructor", self.describe_callee(frame, *callee))));
                }
                let args = self.eval_arguments(frame, arguments)?;
                let instance = ScriptValue::Object(self.create_object()?);
                let result = self.call_function(&function, &instance, &args)?;
                Ok(if result.as_object().is_some() { result } else { instance })
            }
            other => Err(ScriptError::internal(format!("unexpected expression {:?}", other))),
        }
    }

    fn eval_arguments(&mut self, frame: &Frame, arguments: &[NodeId]) -> Result<Vec<HeapValue>, ScriptError> {
        arguments.iter().map(|arg| self.eval_expr(frame, *arg)).collect()
    }

    fn describe_callee(&self, frame: &Frame, callee: NodeId) -> String {
        match frame.ast.get(callee) {
            Some(Node::Identifier(name)) => name.to_string(),
            Some(Node::Member { property, .. }) => property.to_string(),
            _ => "expression".to_string(),
        }
    }

    fn eval_unary(&mut self, frame: &Frame, op: UnaryOp, argument: NodeId) -> Result<HeapValue, ScriptError> {
        match op {
            UnaryOp::Typeof => {
                let value = match node(frame, argument)? {
                    Node::Identifier(name) => match self.lookup_variable(frame, name) {
                        Err(ScriptError::Reference(_)) => ScriptValue::Undefined,
                        other => other?,
                    },
                    _ => self.eval_expr(frame, argument)?,
                };
                let name = if self.is_callable(&value) { "function" } else { value.type_name() };
                Ok(ScriptValue::from(name))
            }
            UnaryOp::Minus => {
                let value = self.eval_expr(frame, argument)?;
                Ok(ScriptValue::Number(-self.to_number(&value)?))
            }
            UnaryOp::Not => Ok(ScriptValue::Bool(!self.eval_expr(frame, argument)?.truthy())),
        }
    }

    fn to_number(&mut self, value: &HeapValue) -> Result<f64, ScriptError> {
        match value {
            ScriptValue::Object(_) => {
                let text = ScriptEngine::to_string(self, value)?;
                Ok(ScriptValue::<ObjectId>::String(text).to_number())
            }
            other => Ok(other.to_number()),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &HeapValue, right: &HeapValue) -> Result<HeapValue, ScriptError> {
        let value = match op {
            BinaryOp::Add => {
                let stringy = |v: &HeapValue| matches!(v, ScriptValue::String(_) | ScriptValue::Object(_));
                if stringy(left) || stringy(right) {
                    let mut text = ScriptEngine::to_string(self, left)?;
                    text.push_str(&ScriptEngine::to_string(self, right)?);
                    ScriptValue::String(text)
                } else {
                    ScriptValue::Number(left.to_number() + right.to_number())
                }
            }
            BinaryOp::Sub => ScriptValue::Number(self.to_number(left)? - self.to_number(right)?),
            BinaryOp::Mul => ScriptValue::Number(self.to_number(left)? * self.to_number(right)?),
            BinaryOp::Div => ScriptValue::Number(self.to_number(left)? / self.to_number(right)?),
            BinaryOp::Mod => ScriptValue::Number(self.to_number(left)? % self.to_number(right)?),
            BinaryOp::LessThan | BinaryOp::LessThanEq | BinaryOp::GreaterThan | BinaryOp::GreaterThanEq => {
                ScriptValue::Bool(self.compare(op, left, right)?)
            }
            BinaryOp::Equal => ScriptValue::Bool(self.loose_equals(left, right)?),
            BinaryOp::NotEqual => ScriptValue::Bool(!self.loose_equals(left, right)?),
            BinaryOp::StrictEqual => ScriptValue::Bool(strict_equals(left, right)),
            BinaryOp::StrictNotEqual => ScriptValue::Bool(!strict_equals(left, right)),
        };
        Ok(value)
    }

    fn compare(&mut self, op: BinaryOp, left: &HeapValue, right: &HeapValue) -> Result<bool, ScriptError> {
        if let (ScriptValue::String(a), ScriptValue::String(b)) = (left, right) {
            return Ok(match op {
                BinaryOp::LessThan => a < b,
                BinaryOp::LessThanEq => a <= b,
                BinaryOp::GreaterThan => a > b,
                _ => a >= b,
            });
        }
        let (a, b) = (self.to_number(left)?, self.to_number(right)?);
        Ok(match op {
            BinaryOp::LessThan => a < b,
            BinaryOp::LessThanEq => a <= b,
            BinaryOp::GreaterThan => a > b,
            _ => a >= b,
        })
    }

    fn loose_equals(&mut self, left: &HeapValue, right: &HeapValue) -> Result<bool, ScriptError> {
        if same_type(left, right) {
            return Ok(strict_equals(left, right));
        }
        if left.is_nullish() || right.is_nullish() {
            return Ok(left.is_nullish() && right.is_nullish());
        }
        match (left, right) {
            (ScriptValue::Object(_), other) | (other, ScriptValue::Object(_)) => {
                let object = if left.as_object().is_some() { left } else { right };
                let text = ScriptValue::String(ScriptEngine::to_string(self, object)?);
                self.loose_equals(&text, other)
            }
            _ => Ok(left.to_number() == right.to_number()),
        }
    }
}
