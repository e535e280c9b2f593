//! C4: compiles a closed `ExprNode` tree (C1) into a live `NodeRef` graph.
//! Parameters are bound to the caller-supplied argument vector by ordinal;
//! a quoted `Lambda` reached through `Invoke` is compiled in place with its
//! own parameter ordinals temporarily overridden to point at the freshly
//! compiled call-site argument nodes, rather than producing a runtime
//! delegate value (§9 Open Question 1: this engine's closed `Value` set has
//! no delegate variant, so only the quoted-lambda invocation shape is
//! supported).

use super::array::ArrayNode;
use super::binary::BinaryNode;
use super::coalesce::CoalesceNode;
use super::conditional::ConditionalNode;
use super::constant::ConstantNode;
use super::construct::{CompiledBinding, MemberInitNode, NewNode};
use super::index::IndexNode;
use super::invoke::InvokeNode;
use super::logical::{LogicalNode, LogicalOp};
use super::member::MemberNode;
use super::method_call::CallNode;
use super::parameter::ParameterNode;
use super::type_is::TypeIsNode;
use super::unary::UnaryNode;
use super::NodeRef;
use crate::expr::{ExprKind, ExprNode};
use crate::fault::Fault;
use crate::options::Options;
use crate::value::Value;
use fxhash::FxHashMap;
use std::sync::Arc;
use triomphe::Arc as TArc;

struct Ctx<'a> {
    args: &'a [Value],
    options: &'a Arc<Options>,
    overrides: FxHashMap<usize, NodeRef>,
}

/// Compile a tree rooted at `expr` into a live node graph, applying the
/// configured optimizer rewrite (C3) first if one is set.
pub fn compile_root(expr: TArc<ExprNode>, args: &[Value], options: Arc<Options>) -> Result<NodeRef, Fault> {
    let expr = match options.optimizer() {
        Some(opt) => opt(expr),
        None => expr,
    };
    let ctx = Ctx { args, options: &options, overrides: FxHashMap::default() };
    compile(&expr, &ctx)
}

fn compile(expr: &TArc<ExprNode>, ctx: &Ctx) -> Result<NodeRef, Fault> {
    match &expr.kind {
        ExprKind::Constant(v) => Ok(ConstantNode::new(expr.clone(), v.clone(), expr.typ)),

        ExprKind::Parameter(ordinal) => {
            if let Some(bound) = ctx.overrides.get(ordinal) {
                return Ok(bound.clone());
            }
            let value = ctx.args.get(*ordinal).cloned().ok_or_else(|| Fault::NotSupportedExpression {
                reason: arcstr::format!("parameter {ordinal} has no bound argument"),
            })?;
            Ok(ParameterNode::new(expr.clone(), value))
        }

        ExprKind::Member(target, descriptor) => {
            let target = compile(target, ctx)?;
            Ok(MemberNode::new(expr.clone(), expr.typ, descriptor.clone(), target, ctx.options.clone()))
        }

        ExprKind::Index(target, descriptor, args) => {
            let target = compile(target, ctx)?;
            let args = compile_each(args, ctx)?;
            Ok(IndexNode::new(expr.clone(), expr.typ, descriptor.clone(), target, args, ctx.options.clone()))
        }

        ExprKind::Unary(op, operand, result_type, method) => {
            let operand = compile(operand, ctx)?;
            Ok(UnaryNode::new(expr.clone(), expr.typ, *op, *result_type, method.clone(), operand))
        }

        ExprKind::Binary(op, left, right, method) => {
            let left = compile(left, ctx)?;
            let right = compile(right, ctx)?;
            Ok(BinaryNode::new(expr.clone(), expr.typ, *op, method.clone(), left, right))
        }

        ExprKind::Conditional(test, if_true, if_false) => {
            let test = compile(test, ctx)?;
            let if_true = compile(if_true, ctx)?;
            let if_false = compile(if_false, ctx)?;
            Ok(ConditionalNode::new(expr.clone(), expr.typ, test, if_true, if_false))
        }

        ExprKind::Coalesce(left, right, conversion) => {
            let left = compile(left, ctx)?;
            let right = compile(right, ctx)?;
            Ok(CoalesceNode::new(expr.clone(), expr.typ, left, right, conversion.clone()))
        }

        ExprKind::AndAlso(left, right) => {
            let left = compile(left, ctx)?;
            let right = compile(right, ctx)?;
            Ok(LogicalNode::new(expr.clone(), expr.typ, LogicalOp::AndAlso, left, right))
        }

        ExprKind::OrElse(left, right) => {
            let left = compile(left, ctx)?;
            let right = compile(right, ctx)?;
            Ok(LogicalNode::new(expr.clone(), expr.typ, LogicalOp::OrElse, left, right))
        }

        ExprKind::TypeIs(operand, target_type) => {
            let operand = compile(operand, ctx)?;
            Ok(TypeIsNode::new(expr.clone(), *target_type, operand))
        }

        ExprKind::Call(target, descriptor, args) => {
            let target = target.as_ref().map(|t| compile(t, ctx)).transpose()?;
            let args = compile_each(args, ctx)?;
            Ok(CallNode::new(expr.clone(), expr.typ, descriptor.clone(), target, args, ctx.options.clone()))
        }

        ExprKind::Invoke(target, args) => compile_invoke(expr, target, args, ctx),

        ExprKind::New(descriptor, args) => {
            let args = compile_each(args, ctx)?;
            Ok(NewNode::new(expr.clone(), expr.typ, descriptor.clone(), args, ctx.options.clone()))
        }

        ExprKind::NewArrayInit(_element_type, elements) => {
            let elements = compile_each(elements, ctx)?;
            Ok(ArrayNode::new(expr.clone(), elements))
        }

        ExprKind::MemberInit(new_expr, bindings) => {
            if let ExprKind::New(descriptor, _) = &new_expr.kind {
                if descriptor.by_value {
                    return Err(Fault::NotSupportedExpression {
                        reason: arcstr::format!("{} is a by-value type; MemberInit requires identity", descriptor.name),
                    });
                }
            }
            let compiled_new = compile(new_expr, ctx)?;
            let compiled_bindings = bindings
                .iter()
                .map(|b| {
                    compile(&b.value, ctx).map(|value| CompiledBinding { member: b.member.clone(), value })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MemberInitNode::new(expr.clone(), expr.typ, compiled_new, compiled_bindings))
        }

        ExprKind::Lambda(..) => Err(Fault::NotSupportedExpression {
            reason: "a quoted lambda is only a valid expression shape as the target of Invoke".into(),
        }),
    }
}

fn compile_invoke(
    expr: &TArc<ExprNode>,
    target: &TArc<ExprNode>,
    args: &Arc<[TArc<ExprNode>]>,
    ctx: &Ctx,
) -> Result<NodeRef, Fault> {
    let ExprKind::Lambda(body, param_ordinals) = &target.kind else {
        return Err(Fault::NotSupportedExpression {
            reason: "Invoke target must be a quoted lambda; this engine has no delegate value".into(),
        });
    };
    if param_ordinals.len() != args.len() {
        return Err(Fault::NotSupportedExpression {
            reason: arcstr::format!(
                "lambda expects {} arguments, {} given",
                param_ordinals.len(),
                args.len()
            ),
        });
    }

    let compiled_args = compile_each(args, ctx)?;

    let mut overrides = ctx.overrides.clone();
    for (ordinal, node) in param_ordinals.iter().zip(compiled_args.into_iter()) {
        overrides.insert(*ordinal, node);
    }
    let inner_ctx = Ctx { args: ctx.args, options: ctx.options, overrides };
    let body_node = compile(body, &inner_ctx)?;

    Ok(InvokeNode::new(expr.clone(), expr.typ, body_node))
}

fn compile_each(exprs: &[TArc<ExprNode>], ctx: &Ctx) -> Result<Vec<NodeRef>, Fault> {
    exprs.iter().map(|e| compile(e, ctx)).collect()
}
