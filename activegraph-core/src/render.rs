//! C9: renders a compiled expression tree back to the canonical textual
//! form described in §6 -- infix operators in parens, a `checked` prefix
//! for the checked arithmetic variants, explicit unary forms, `Math.Pow`
//! for `Power`, parenthesized cast syntax for conversions, and literal
//! constants wrapped in braces.
//!
//! [`render_node`] additionally annotates every subexpression reachable
//! from a live [`ActiveNode`], not only the root: each subexpression gets
//! a trailing `/* = value */` or `/* [ErrorKind: message] */` comment for
//! whichever live node [`ActiveNode::children`] currently exposes at that
//! position. A subexpression with no corresponding live child (e.g. a
//! short-circuit node's currently-unselected branch) renders plain, with
//! no annotation.

use crate::expr::{BinaryOp, ExprKind, ExprNode, UnaryOp};
use crate::fault::Fault;
use crate::node::{ActiveNode, NodeRef};
use crate::value::Value;
use std::fmt::Write;

pub fn render_expr(expr: &ExprNode) -> String {
    let mut out = String::new();
    write_expr_impl(&mut out, expr, &PlainRenderer);
    out
}

/// Render `node` and, recursively, every live subexpression reachable
/// from it, each annotated with its own current value or fault.
pub fn render_node(node: &dyn ActiveNode) -> String {
    let mut out = String::new();
    let r = LiveRenderer { node };
    write_expr_impl(&mut out, node.spec(), &r);
    annotate(&mut out, node.current_value().as_ref(), node.current_fault().as_ref());
    out
}

/// Decides how a subexpression's children are rendered: plain syntax only,
/// or syntax plus a live-value/fault annotation per child.
trait ChildRenderer {
    fn render_child(&self, out: &mut String, child: &ExprNode);
}

struct PlainRenderer;

impl ChildRenderer for PlainRenderer {
    fn render_child(&self, out: &mut String, child: &ExprNode) {
        write_expr_impl(out, child, self);
    }
}

struct LiveRenderer<'a> {
    node: &'a dyn ActiveNode,
}

impl ChildRenderer for LiveRenderer<'_> {
    fn render_child(&self, out: &mut String, child: &ExprNode) {
        match find_live_child(self.node, child) {
            Some(live) => {
                let sub = LiveRenderer { node: &*live };
                write_expr_impl(out, child, &sub);
                annotate(out, live.current_value().as_ref(), live.current_fault().as_ref());
            }
            None => write_expr_impl(out, child, &PlainRenderer),
        }
    }
}

/// Linear search over `parent`'s currently-subscribed children for one
/// whose spec is structurally equal to `target`. If two sibling
/// subexpressions happen to be structurally identical, this may pick the
/// wrong one; acceptable for a debug-rendering feature.
fn find_live_child(parent: &dyn ActiveNode, target: &ExprNode) -> Option<NodeRef> {
    parent.children().into_iter().find(|c| {
        let spec: &ExprNode = c.spec();
        spec == target
    })
}

fn annotate(out: &mut String, value: Option<&Value>, fault: Option<&Fault>) {
    match (value, fault) {
        (_, Some(f)) => {
            let _ = write!(out, " /* [{}: {f}] */", f.kind_name());
        }
        (Some(v), None) => {
            let _ = write!(out, " /* = {} */", render_value(v));
        }
        (None, None) => {}
    }
}

fn write_expr_impl(out: &mut String, expr: &ExprNode, r: &dyn ChildRenderer) {
    match &expr.kind {
        ExprKind::Constant(v) => {
            let _ = write!(out, "{{{}}}", render_value(v));
        }
        ExprKind::Parameter(ordinal) => {
            let _ = write!(out, "${ordinal}");
        }
        ExprKind::Member(target, desc) => {
            r.render_child(out, target);
            let _ = write!(out, ".{}", desc.name);
        }
        ExprKind::Index(target, _desc, args) => {
            r.render_child(out, target);
            out.push('[');
            write_args(out, args, r);
            out.push(']');
        }
        ExprKind::Unary(op, operand, result_type, _method) => write_unary(out, *op, operand, *result_type, r),
        ExprKind::Binary(op, l, rhs, _method) => write_binary(out, *op, l, rhs, r),
        ExprKind::Conditional(test, t, f) => {
            out.push('(');
            r.render_child(out, test);
            out.push_str(" ? ");
            r.render_child(out, t);
            out.push_str(" : ");
            r.render_child(out, f);
            out.push(')');
        }
        ExprKind::Coalesce(l, rhs, _conv) => {
            out.push('(');
            r.render_child(out, l);
            out.push_str(" ?? ");
            r.render_child(out, rhs);
            out.push(')');
        }
        ExprKind::AndAlso(l, rhs) => {
            out.push('(');
            r.render_child(out, l);
            out.push_str(" && ");
            r.render_child(out, rhs);
            out.push(')');
        }
        ExprKind::OrElse(l, rhs) => {
            out.push('(');
            r.render_child(out, l);
            out.push_str(" || ");
            r.render_child(out, rhs);
            out.push(')');
        }
        ExprKind::TypeIs(operand, target) => {
            out.push('(');
            r.render_child(out, operand);
            let _ = write!(out, " is {target:?})");
        }
        ExprKind::Call(target, desc, args) => {
            if let Some(target) = target {
                r.render_child(out, target);
                out.push('.');
            }
            let _ = write!(out, "{}(", desc.name);
            write_args(out, args, r);
            out.push(')');
        }
        ExprKind::Invoke(target, args) => {
            r.render_child(out, target);
            out.push('(');
            write_args(out, args, r);
            out.push(')');
        }
        ExprKind::New(desc, args) => {
            let _ = write!(out, "new {}(", desc.name);
            write_args(out, args, r);
            out.push(')');
        }
        ExprKind::NewArrayInit(elem_type, elements) => {
            let _ = write!(out, "new {elem_type:?}[] {{");
            write_args(out, elements, r);
            out.push('}');
        }
        ExprKind::MemberInit(new_expr, bindings) => {
            r.render_child(out, new_expr);
            out.push_str(" { ");
            for (i, b) in bindings.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} = ", b.member.name);
                r.render_child(out, &b.value);
            }
            out.push_str(" }");
        }
        ExprKind::Lambda(body, params) => {
            out.push('(');
            for (i, p) in params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "${p}");
            }
            out.push_str(") => ");
            r.render_child(out, body);
        }
    }
}

fn write_args(out: &mut String, args: &[triomphe::Arc<ExprNode>], r: &dyn ChildRenderer) {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        r.render_child(out, a);
    }
}

fn write_unary(
    out: &mut String,
    op: UnaryOp,
    operand: &ExprNode,
    result_type: crate::value::ValueType,
    r: &dyn ChildRenderer,
) {
    match op {
        UnaryOp::Negate => {
            out.push_str("(-");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::NegateChecked => {
            out.push_str("checked(-");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::UnaryPlus => {
            out.push_str("(+");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::Not => {
            out.push_str("(!");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::OnesComplement => {
            out.push_str("(~");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::Increment => {
            out.push('(');
            r.render_child(out, operand);
            out.push_str(" + 1)");
        }
        UnaryOp::Decrement => {
            out.push('(');
            r.render_child(out, operand);
            out.push_str(" - 1)");
        }
        UnaryOp::Convert => {
            let _ = write!(out, "(({result_type:?})");
            r.render_child(out, operand);
            out.push(')');
        }
        UnaryOp::ConvertChecked => {
            let _ = write!(out, "checked(({result_type:?})");
            r.render_child(out, operand);
            out.push(')');
        }
    }
}

fn write_binary(out: &mut String, op: BinaryOp, l: &ExprNode, rhs: &ExprNode, r: &dyn ChildRenderer) {
    if op == BinaryOp::Power {
        out.push_str("Math.Pow(");
        r.render_child(out, l);
        out.push_str(", ");
        r.render_child(out, rhs);
        out.push(')');
        return;
    }
    let (checked, sym) = match op {
        BinaryOp::Add => (false, "+"),
        BinaryOp::AddChecked => (true, "+"),
        BinaryOp::Subtract => (false, "-"),
        BinaryOp::SubtractChecked => (true, "-"),
        BinaryOp::Multiply => (false, "*"),
        BinaryOp::MultiplyChecked => (true, "*"),
        BinaryOp::Divide => (false, "/"),
        BinaryOp::Modulo => (false, "%"),
        BinaryOp::Equal => (false, "=="),
        BinaryOp::NotEqual => (false, "!="),
        BinaryOp::LessThan => (false, "<"),
        BinaryOp::GreaterThan => (false, ">"),
        BinaryOp::LessThanOrEqual => (false, "<="),
        BinaryOp::GreaterThanOrEqual => (false, ">="),
        BinaryOp::And => (false, "&"),
        BinaryOp::Or => (false, "|"),
        BinaryOp::ExclusiveOr => (false, "^"),
        BinaryOp::Power => unreachable!(),
    };
    if checked {
        out.push_str("checked(");
    } else {
        out.push('(');
    }
    r.render_child(out, l);
    let _ = write!(out, " {sym} ");
    r.render_child(out, rhs);
    out.push(')');
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F64(f) => f.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::DateTime(dt) => format!("DateTime.Parse(\"{}\")", dt.to_rfc3339()),
        Value::TimeSpan(d) => format!("TimeSpan.FromTicks({})", d.num_nanoseconds().unwrap_or(0) / 100),
        Value::Guid(g) => format!("Guid.Parse(\"{g}\")"),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(_) => "<object>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;
    use triomphe::Arc as TArc;

    #[test]
    fn plain_render_has_no_annotations() {
        let left = ExprNode::new(ExprKind::Constant(Value::I64(1)), ValueType::I64);
        let right = ExprNode::new(ExprKind::Constant(Value::I64(2)), ValueType::I64);
        let expr = ExprNode::new(
            ExprKind::Binary(BinaryOp::Add, left, right, None),
            ValueType::I64,
        );
        assert_eq!(render_expr(&expr), "({1} + {2})");
    }

    #[test]
    fn live_render_annotates_nested_fault_in_bracket_format() {
        struct Leaf {
            spec: TArc<ExprNode>,
            fault: Option<Fault>,
            value: Option<Value>,
        }
        impl std::fmt::Debug for Leaf {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct("Leaf").finish()
            }
        }
        impl ActiveNode for Leaf {
            fn current_value(&self) -> Option<Value> {
                self.value.clone()
            }
            fn current_fault(&self) -> Option<Fault> {
                self.fault.clone()
            }
            fn typ(&self) -> ValueType {
                ValueType::I64
            }
            fn spec(&self) -> &TArc<ExprNode> {
                &self.spec
            }
            fn subscribe(&self, _listener: crate::value::Listener) -> crate::value::ListenerId {
                crate::value::ListenerId::new(0)
            }
            fn unsubscribe(&self, _id: crate::value::ListenerId) {}
            fn refs(&self, _out: &mut crate::node::Refs) {}
        }

        struct Root {
            spec: TArc<ExprNode>,
            left: NodeRef,
            right: NodeRef,
        }
        impl std::fmt::Debug for Root {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct("Root").finish()
            }
        }
        impl ActiveNode for Root {
            fn current_value(&self) -> Option<Value> {
                None
            }
            fn current_fault(&self) -> Option<Fault> {
                self.left.current_fault()
            }
            fn typ(&self) -> ValueType {
                ValueType::I64
            }
            fn spec(&self) -> &TArc<ExprNode> {
                &self.spec
            }
            fn subscribe(&self, _listener: crate::value::Listener) -> crate::value::ListenerId {
                crate::value::ListenerId::new(0)
            }
            fn unsubscribe(&self, _id: crate::value::ListenerId) {}
            fn refs(&self, _out: &mut crate::node::Refs) {}
            fn children(&self) -> Vec<NodeRef> {
                vec![self.left.clone(), self.right.clone()]
            }
        }

        let left_spec = ExprNode::new(ExprKind::Constant(Value::I64(1)), ValueType::I64);
        let right_spec = ExprNode::new(ExprKind::Constant(Value::I64(2)), ValueType::I64);
        let root_spec = ExprNode::new(
            ExprKind::Binary(BinaryOp::Add, left_spec.clone(), right_spec.clone(), None),
            ValueType::I64,
        );

        let left: NodeRef = std::sync::Arc::new(Leaf {
            spec: left_spec,
            fault: Some(Fault::NullTarget { member: "x".into() }),
            value: None,
        });
        let right: NodeRef =
            std::sync::Arc::new(Leaf { spec: right_spec, fault: None, value: Some(Value::I64(2)) });
        let root = Root { spec: root_spec, left, right };

        let rendered = render_node(&root);
        assert_eq!(rendered, "({1} /* [NullTarget: null target for member x] */ + {2} /* = 2 */) /* [NullTarget: null target for member x] */");
    }
}
