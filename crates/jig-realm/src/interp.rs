//! Tree-walking interpreter.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, ClassDef, DeclKind, Expr, FunctionDef, LogicalOp, PropName, Stmt, UnaryOp,
};
use crate::error::{RealmError, RealmResult};
use crate::heap::{FunctionKind, ObjectKind, Property};
use crate::realm::Realm;
use crate::scope::{self, Scope, ScopeRef};
use crate::value::{ObjectId, Value};

/// Synthetic name given to anonymous classes.
pub const ANONYMOUS_CLASS: &str = "Anonymous";

/// Synthetic name given to anonymous functions.
pub const ANONYMOUS_FUNCTION: &str = "anonymousFunction";

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Completion {
    /// Fell through. Carries the value of the last expression or declaration.
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Run `stmts` directly in `scope`, hoisting function declarations first.
pub(crate) fn exec_block(
    realm: &mut Realm,
    stmts: &[Stmt],
    scope: &ScopeRef,
) -> RealmResult<Completion> {
    for stmt in stmts {
        if let Stmt::Function(def) = stmt {
            let name = def.name.clone().unwrap_or_else(|| ANONYMOUS_FUNCTION.to_owned());
            let id = realm.make_function(Rc::clone(def), scope, None, FunctionKind::Plain, &name);
            scope.borrow_mut().declare(name, Value::Object(id), true);
        }
    }
    let mut last = Value::Undefined;
    for stmt in stmts {
        match exec(realm, stmt, scope)? {
            Completion::Normal(v) => last = v,
            other => return Ok(other),
        }
    }
    Ok(Completion::Normal(last))
}

fn exec(realm: &mut Realm, stmt: &Stmt, scope: &ScopeRef) -> RealmResult<Completion> {
    realm.step()?;
    match stmt {
        Stmt::Empty => Ok(Completion::Normal(Value::Undefined)),
        Stmt::Expr(expr) => eval(realm, expr, scope).map(Completion::Normal),
        Stmt::Decl { kind, decls } => {
            for (name, init) in decls {
                let value = match init {
                    Some(expr) => eval_named(realm, expr, scope, name)?,
                    None => Value::Undefined,
                };
                scope
                    .borrow_mut()
                    .declare(name.clone(), value, *kind != DeclKind::Const);
            }
            Ok(Completion::Normal(Value::Undefined))
        },
        Stmt::Function(def) => {
            let name = def.name.as_deref().unwrap_or(ANONYMOUS_FUNCTION);
            Ok(Completion::Normal(
                scope::lookup(scope, name).unwrap_or_default(),
            ))
        },
        Stmt::Class(def) => {
            let id = eval_class(realm, def, scope, None)?;
            let name = def.name.clone().unwrap_or_else(|| ANONYMOUS_CLASS.to_owned());
            scope.borrow_mut().declare(name, id.clone(), true);
            Ok(Completion::Normal(id))
        },
        Stmt::If {
            test,
            then,
            otherwise,
        } => {
            if eval(realm, test, scope)?.truthy() {
                exec_scoped(realm, then, scope)
            } else if let Some(other) = otherwise {
                exec_scoped(realm, other, scope)
            } else {
                Ok(Completion::Normal(Value::Undefined))
            }
        },
        Stmt::While { test, body } => {
            while eval(realm, test, scope)?.truthy() {
                realm.step()?;
                match exec_scoped(realm, body, scope)? {
                    Completion::Break => break,
                    Completion::Return(v) => return Ok(Completion::Return(v)),
                    Completion::Continue | Completion::Normal(_) => {},
                }
            }
            Ok(Completion::Normal(Value::Undefined))
        },
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            let loop_scope = Scope::child(scope);
            if let Some(init) = init {
                exec(realm, init, &loop_scope)?;
            }
            loop {
                if let Some(test) = test {
                    if !eval(realm, test, &loop_scope)?.truthy() {
                        break;
                    }
                }
                realm.step()?;
                match exec_scoped(realm, body, &loop_scope)? {
                    Completion::Break => break,
                    Completion::Return(v) => return Ok(Completion::Return(v)),
                    Completion::Continue | Completion::Normal(_) => {},
                }
                if let Some(update) = update {
                    eval(realm, update, &loop_scope)?;
                }
            }
            Ok(Completion::Normal(Value::Undefined))
        },
        Stmt::ForOf {
            kind,
            name,
            iterable,
            body,
        } => {
            let iterable = eval(realm, iterable, scope)?;
            for item in realm.iterate(&iterable)? {
                realm.step()?;
                let iter_scope = Scope::child(scope);
                iter_scope
                    .borrow_mut()
                    .declare(name.clone(), item, *kind != DeclKind::Const);
                match exec_scoped(realm, body, &iter_scope)? {
                    Completion::Break => break,
                    Completion::Return(v) => return Ok(Completion::Return(v)),
                    Completion::Continue | Completion::Normal(_) => {},
                }
            }
            Ok(Completion::Normal(Value::Undefined))
        },
        Stmt::Return(expr) => {
            let value = match expr {
                Some(e) => eval(realm, e, scope)?,
                None => Value::Undefined,
            };
            Ok(Completion::Return(value))
        },
        Stmt::Throw(expr) => {
            let value = eval(realm, expr, scope)?;
            Err(realm.throw_value(value))
        },
        Stmt::Break => Ok(Completion::Break),
        Stmt::Continue => Ok(Completion::Continue),
        Stmt::Block(stmts) => exec_block(realm, stmts, &Scope::child(scope)),
    }
}

fn exec_scoped(realm: &mut Realm, stmt: &Stmt, scope: &ScopeRef) -> RealmResult<Completion> {
    match stmt {
        Stmt::Block(stmts) => exec_block(realm, stmts, &Scope::child(scope)),
        other => exec(realm, other, scope),
    }
}

/// Evaluate `expr`, naming anonymous functions and classes after the binding
/// they initialise.
fn eval_named(realm: &mut Realm, expr: &Expr, scope: &ScopeRef, name: &str) -> RealmResult<Value> {
    match expr {
        Expr::Function(def) if def.name.is_none() => Ok(make_function(realm, def, scope, Some(name))),
        Expr::Class(def) if def.name.is_none() => eval_class(realm, def, scope, Some(name)),
        other => eval(realm, other, scope),
    }
}

fn make_function(
    realm: &mut Realm,
    def: &Rc<FunctionDef>,
    scope: &ScopeRef,
    inferred: Option<&str>,
) -> Value {
    let name = def
        .name
        .as_deref()
        .or(inferred)
        .unwrap_or(ANONYMOUS_FUNCTION)
        .to_owned();
    Value::Object(realm.make_function(Rc::clone(def), scope, None, FunctionKind::Plain, &name))
}

fn eval_class(
    realm: &mut Realm,
    def: &Rc<ClassDef>,
    scope: &ScopeRef,
    inferred: Option<&str>,
) -> RealmResult<Value> {
    let parent = match &def.extends {
        Some(expr) => match eval(realm, expr, scope)? {
            Value::Object(id) => Some(id),
            other => {
                return Err(RealmError::Type(format!(
                    "Class extends value {} is not a constructor or null",
                    realm.type_name(&other)
                )));
            },
        },
        None => None,
    };
    let name = def
        .name
        .as_deref()
        .or(inferred)
        .unwrap_or(ANONYMOUS_CLASS)
        .to_owned();
    realm
        .make_class(Rc::clone(def), scope, parent, &name)
        .map(Value::Object)
}

/// Evaluate an expression.
pub(crate) fn eval(realm: &mut Realm, expr: &Expr, scope: &ScopeRef) -> RealmResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Undefined => Ok(Value::Undefined),
        Expr::Ident(name) => scope::lookup(scope, name)
            .ok_or_else(|| RealmError::Reference(format!("{name} is not defined"))),
        Expr::This => Ok(scope::this_value(scope)),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(realm, item, scope)?);
            }
            Ok(Value::Object(realm.new_array(values)))
        },
        Expr::Object(props) => {
            let id = realm.new_object();
            for (key, value) in props {
                let value = eval_named(realm, value, scope, key)?;
                realm.raw_define(id, key, Property::data(value))?;
            }
            Ok(Value::Object(id))
        },
        Expr::Member { object, property } => {
            let object = eval(realm, object, scope)?;
            let key = property_key(realm, property, scope)?;
            realm.get(&object, &key)
        },
        Expr::Call { callee, args } => eval_call(realm, callee, args, scope),
        Expr::New { callee, args } => {
            let callee = eval(realm, callee, scope)?;
            let args = eval_args(realm, args, scope)?;
            realm.construct(&callee, &args)
        },
        Expr::Unary { op, expr } => eval_unary(realm, *op, expr, scope),
        Expr::Binary { op, left, right } => {
            let l = eval(realm, left, scope)?;
            let r = eval(realm, right, scope)?;
            binary(realm, *op, &l, &r)
        },
        Expr::Logical { op, left, right } => {
            let l = eval(realm, left, scope)?;
            let short = match op {
                LogicalOp::And => !l.truthy(),
                LogicalOp::Or => l.truthy(),
                LogicalOp::Nullish => !l.is_nullish(),
            };
            if short { Ok(l) } else { eval(realm, right, scope) }
        },
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if eval(realm, test, scope)?.truthy() {
                eval(realm, then, scope)
            } else {
                eval(realm, otherwise, scope)
            }
        },
        Expr::Assign { op, target, value } => eval_assign(realm, *op, target, value, scope),
        Expr::Update {
            target,
            increment,
            prefix,
        } => {
            let current = read_target(realm, target, scope)?;
            let old = realm.to_number(&current);
            let new = if *increment { old + 1.0 } else { old - 1.0 };
            write_target(realm, target, Value::Number(new), scope)?;
            Ok(Value::Number(if *prefix { new } else { old }))
        },
        Expr::Function(def) => Ok(make_function(realm, def, scope, None)),
        Expr::Class(def) => eval_class(realm, def, scope, None),
        Expr::SuperCall(args) => {
            let args = eval_args(realm, args, scope)?;
            let parent = super_class(realm)?;
            let this = scope::this_value(scope);
            realm.run_constructor(parent, this, &args)?;
            Ok(Value::Undefined)
        },
        Expr::SuperMember(name) => {
            let holder = super_holder(realm)?;
            realm.get(&holder, name)
        },
    }
}

fn eval_args(realm: &mut Realm, args: &[Expr], scope: &ScopeRef) -> RealmResult<Vec<Value>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(eval(realm, arg, scope)?);
    }
    Ok(out)
}

fn property_key(realm: &mut Realm, property: &PropName, scope: &ScopeRef) -> RealmResult<String> {
    match property {
        PropName::Static(name) => Ok(name.clone()),
        PropName::Computed(expr) => {
            let key = eval(realm, expr, scope)?;
            realm.to_property_key(&key)
        },
    }
}

fn eval_call(realm: &mut Realm, callee: &Expr, args: &[Expr], scope: &ScopeRef) -> RealmResult<Value> {
    let (function, this) = match callee {
        Expr::Member { object, property } => {
            let object = eval(realm, object, scope)?;
            let key = property_key(realm, property, scope)?;
            let function = realm.get(&object, &key)?;
            if !is_callable(realm, &function) {
                return Err(RealmError::Type(format!("{key} is not a function")));
            }
            (function, object)
        },
        Expr::SuperMember(name) => {
            let holder = super_holder(realm)?;
            let function = realm.get(&holder, name)?;
            (function, scope::this_value(scope))
        },
        Expr::Ident(name) => {
            let function = eval(realm, callee, scope)?;
            if !is_callable(realm, &function) {
                return Err(RealmError::Type(format!("{name} is not a function")));
            }
            (function, Value::Undefined)
        },
        other => (eval(realm, other, scope)?, Value::Undefined),
    };
    let args = eval_args(realm, args, scope)?;
    realm.call(&function, this, &args)
}

fn is_callable(realm: &Realm, value: &Value) -> bool {
    match value {
        Value::Object(id) => realm.target_kind(*id).is_ok_and(ObjectKind::is_callable),
        _ => false,
    }
}

fn super_class(realm: &Realm) -> RealmResult<ObjectId> {
    let class = realm
        .current_frame()
        .and_then(|f| f.class)
        .ok_or_else(|| RealmError::Syntax("'super' keyword unexpected here".to_owned()))?;
    match &realm.object(class)?.kind {
        ObjectKind::Class(c) => c
            .parent
            .ok_or_else(|| RealmError::Syntax("'super' keyword unexpected here".to_owned())),
        _ => Err(RealmError::Syntax("'super' keyword unexpected here".to_owned())),
    }
}

/// Object that `super.x` reads from: the parent class for statics, its
/// prototype otherwise.
fn super_holder(realm: &mut Realm) -> RealmResult<Value> {
    let parent = super_class(realm)?;
    let is_static = realm
        .current_frame()
        .is_some_and(|f| f.kind == FunctionKind::Static);
    if is_static {
        Ok(Value::Object(parent))
    } else {
        realm.raw_get(parent, "prototype")
    }
}

fn eval_unary(realm: &mut Realm, op: UnaryOp, expr: &Expr, scope: &ScopeRef) -> RealmResult<Value> {
    match op {
        UnaryOp::TypeOf => {
            if let Expr::Ident(name) = expr {
                if scope::lookup(scope, name).is_none() {
                    return Ok(Value::string("undefined"));
                }
            }
            let value = eval(realm, expr, scope)?;
            Ok(Value::string(realm.type_of(&value)))
        },
        UnaryOp::Delete => match expr {
            Expr::Member { object, property } => {
                let object = eval(realm, object, scope)?;
                let key = property_key(realm, property, scope)?;
                realm.delete(&object, &key).map(Value::Bool)
            },
            _ => Ok(Value::Bool(false)),
        },
        UnaryOp::Not => Ok(Value::Bool(!eval(realm, expr, scope)?.truthy())),
        UnaryOp::Neg => {
            let v = eval(realm, expr, scope)?;
            Ok(Value::Number(-realm.to_number(&v)))
        },
        UnaryOp::Plus => {
            let v = eval(realm, expr, scope)?;
            Ok(Value::Number(realm.to_number(&v)))
        },
        UnaryOp::Void => {
            eval(realm, expr, scope)?;
            Ok(Value::Undefined)
        },
    }
}

fn read_target(realm: &mut Realm, target: &Expr, scope: &ScopeRef) -> RealmResult<Value> {
    eval(realm, target, scope)
}

fn write_target(realm: &mut Realm, target: &Expr, value: Value, scope: &ScopeRef) -> RealmResult<()> {
    match target {
        Expr::Ident(name) => scope::assign(scope, name, value),
        Expr::Member { object, property } => {
            let object = eval(realm, object, scope)?;
            let key = property_key(realm, property, scope)?;
            realm.set(&object, &key, value)
        },
        _ => Err(RealmError::Syntax(
            "Invalid left-hand side in assignment".to_owned(),
        )),
    }
}

fn eval_assign(
    realm: &mut Realm,
    op: AssignOp,
    target: &Expr,
    value: &Expr,
    scope: &ScopeRef,
) -> RealmResult<Value> {
    // Member targets are evaluated once so `a[i++] += 1` touches one slot.
    let (object, key) = match target {
        Expr::Member { object, property } => {
            let object = eval(realm, object, scope)?;
            let key = property_key(realm, property, scope)?;
            (Some(object), Some(key))
        },
        _ => (None, None),
    };
    let current = match (op, &object, &key) {
        (AssignOp::Assign, _, _) => Value::Undefined,
        (_, Some(object), Some(key)) => realm.get(object, key)?,
        _ => read_target(realm, target, scope)?,
    };
    let rhs = match target {
        Expr::Ident(name) if op == AssignOp::Assign => eval_named(realm, value, scope, name)?,
        _ => eval(realm, value, scope)?,
    };
    let result = match op {
        AssignOp::Assign => rhs,
        AssignOp::Add => binary(realm, BinaryOp::Add, &current, &rhs)?,
        AssignOp::Sub => binary(realm, BinaryOp::Sub, &current, &rhs)?,
        AssignOp::Mul => binary(realm, BinaryOp::Mul, &current, &rhs)?,
    };
    match (object, key) {
        (Some(object), Some(key)) => realm.set(&object, &key, result.clone())?,
        _ => write_target(realm, target, result.clone(), scope)?,
    }
    Ok(result)
}

/// Apply a binary operator.
pub(crate) fn binary(realm: &mut Realm, op: BinaryOp, l: &Value, r: &Value) -> RealmResult<Value> {
    Ok(match op {
        BinaryOp::Add => {
            let l = to_primitive(realm, l)?;
            let r = to_primitive(realm, r)?;
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                let mut s = realm.to_string(&l)?;
                s.push_str(&realm.to_string(&r)?);
                Value::String(s)
            } else {
                Value::Number(realm.to_number(&l) + realm.to_number(&r))
            }
        },
        BinaryOp::Sub => Value::Number(realm.to_number(l) - realm.to_number(r)),
        BinaryOp::Mul => Value::Number(realm.to_number(l) * realm.to_number(r)),
        BinaryOp::Div => Value::Number(realm.to_number(l) / realm.to_number(r)),
        BinaryOp::Rem => Value::Number(realm.to_number(l) % realm.to_number(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_equals(r)),
        BinaryOp::StrictNotEq => Value::Bool(!l.strict_equals(r)),
        BinaryOp::Eq => Value::Bool(loose_equals(realm, l, r)?),
        BinaryOp::NotEq => Value::Bool(!loose_equals(realm, l, r)?),
        BinaryOp::Lt => compare(realm, l, r, |o| o.is_lt())?,
        BinaryOp::LtEq => compare(realm, l, r, |o| o.is_le())?,
        BinaryOp::Gt => compare(realm, l, r, |o| o.is_gt())?,
        BinaryOp::GtEq => compare(realm, l, r, |o| o.is_ge())?,
        BinaryOp::InstanceOf => Value::Bool(realm.instance_of(l, r)?),
        BinaryOp::In => {
            let key = realm.to_property_key(l)?;
            Value::Bool(realm.has(r, &key)?)
        },
    })
}

fn to_primitive(realm: &mut Realm, value: &Value) -> RealmResult<Value> {
    match value {
        Value::Object(_) => realm.to_string(value).map(Value::String),
        other => Ok(other.clone()),
    }
}

fn compare(
    realm: &mut Realm,
    l: &Value,
    r: &Value,
    pick: impl Fn(std::cmp::Ordering) -> bool,
) -> RealmResult<Value> {
    let l = to_primitive(realm, l)?;
    let r = to_primitive(realm, r)?;
    if let (Value::String(a), Value::String(b)) = (&l, &r) {
        return Ok(Value::Bool(pick(a.cmp(b))));
    }
    let a = realm.to_number(&l);
    let b = realm.to_number(&r);
    Ok(Value::Bool(a.partial_cmp(&b).is_some_and(pick)))
}

/// `==`.
pub(crate) fn loose_equals(realm: &mut Realm, l: &Value, r: &Value) -> RealmResult<bool> {
    Ok(match (l, r) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Object(_), Value::Object(_)) => l.strict_equals(r),
        (Value::Object(_), _) => {
            let p = to_primitive(realm, l)?;
            loose_equals(realm, &p, r)?
        },
        (_, Value::Object(_)) => {
            let p = to_primitive(realm, r)?;
            loose_equals(realm, l, &p)?
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => {
            #[allow(clippy::float_cmp)]
            let eq = realm.to_number(l) == realm.to_number(r);
            eq
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::realm::RealmLimits;

    fn run(src: &str) -> RealmResult<Value> {
        let mut realm = Realm::default();
        let scope = Scope::child(&realm.sandbox_globals());
        let program = parse_program(src)?;
        match exec_block(&mut realm, &program, &scope)? {
            Completion::Normal(v) | Completion::Return(v) => Ok(v),
            _ => Ok(Value::Undefined),
        }
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run("1 + 2 * 3").unwrap(), Value::Number(7.0));
        assert_eq!(run("'a' + 1").unwrap(), Value::string("a1"));
        assert_eq!(run("let x = 5; x += 2; x").unwrap(), Value::Number(7.0));
    }

    #[test]
    fn test_loops_and_closures() {
        let src = "function mk() { let n = 0; return function () { n++; return n } }
                   const f = mk(); f(); f(); f()";
        assert_eq!(run(src).unwrap(), Value::Number(3.0));
        let src = "let s = 0; for (let i = 0; i < 10; i++) { if (i == 5) break; s += i } s";
        assert_eq!(run(src).unwrap(), Value::Number(10.0));
        let src = "let s = 0; for (const v of [1, 2, 3]) { s += v } s";
        assert_eq!(run(src).unwrap(), Value::Number(6.0));
    }

    #[test]
    fn test_prefix_and_postfix_updates() {
        assert_eq!(run("let x = 1; x++").unwrap(), Value::Number(1.0));
        assert_eq!(run("let x = 1; ++x").unwrap(), Value::Number(2.0));
        assert_eq!(run("let x = 1; x--; x").unwrap(), Value::Number(0.0));
        let src = "const o = { n: 4 }; o.n++; --o.n; o.n++; o.n";
        assert_eq!(run(src).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_classes_and_super() {
        let src = "class A { constructor(x) { this.x = x } get() { return this.x } }
                   class B extends A { constructor() { super(4) } get() { return super.get() * 2 } }
                   new B().get()";
        assert_eq!(run(src).unwrap(), Value::Number(8.0));
        let src = "class A {} class B extends A {} new B() instanceof A";
        assert_eq!(run(src).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_class_without_new_is_type_error() {
        assert!(matches!(run("class A {} A()"), Err(RealmError::Type(_))));
    }

    #[test]
    fn test_throw_carries_message() {
        let err = run("throw new Error('boom')").unwrap_err();
        assert_eq!(err.message(), "boom");
        assert!(matches!(err, RealmError::Thrown { .. }));
    }

    #[test]
    fn test_const_and_reference_errors() {
        assert!(matches!(run("const a = 1; a = 2"), Err(RealmError::Type(_))));
        assert!(matches!(run("missing + 1"), Err(RealmError::Reference(_))));
        assert_eq!(run("typeof missing").unwrap(), Value::string("undefined"));
    }

    #[test]
    fn test_step_limit() {
        let mut realm = Realm::new(RealmLimits {
            max_steps: 100,
            max_call_depth: 16,
        });
        let scope = Scope::child(&realm.sandbox_globals());
        let program = parse_program("while (true) {}").unwrap();
        let err = exec_block(&mut realm, &program, &scope).unwrap_err();
        assert_eq!(
            err,
            RealmError::Determinism("Execution step limit exceeded".to_owned())
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let mut realm = Realm::new(RealmLimits {
            max_steps: 10_000,
            max_call_depth: 16,
        });
        let scope = Scope::child(&realm.sandbox_globals());
        let program = parse_program("function f() { return f() } f()").unwrap();
        let err = exec_block(&mut realm, &program, &scope).unwrap_err();
        assert_eq!(
            err,
            RealmError::Determinism("Maximum call stack size exceeded".to_owned())
        );
    }

    #[test]
    fn test_anonymous_names() {
        assert_eq!(
            run("const C = class {}; C.name").unwrap(),
            Value::string("C")
        );
        assert_eq!(
            run("(function () {}).name").unwrap(),
            Value::string(ANONYMOUS_FUNCTION)
        );
    }
}
