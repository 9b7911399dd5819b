//! Native bodies of the sample methods
//!
//! Probe offsets passed to [`CallContext::hit`] mark the branches a full
//! batch is expected to reach.

use crate::types::SampleTypes;
use replay_engine::{CallContext, ModuleBuilder, StructValue, Thrown, Value};
use replay_types::{PrimitiveKind, TypeId};

pub(crate) fn define(module: &mut ModuleBuilder<'_>, t: &SampleTypes) {
    let int = module.primitive(PrimitiveKind::I32);
    let long = module.primitive(PrimitiveKind::I64);
    let string = module.well_known().string;

    // Samples.Math
    module
        .method(t.math, "Sum")
        .param(t.int_array)
        .returns(int)
        .expected_coverage(3)
        .body(sum);
    module
        .method(t.math, "Divide")
        .param(int)
        .param(int)
        .returns(int)
        .expected_coverage(3)
        .body(divide);
    // Declaration order matters: without a signature, `Max` binds the int overload
    module
        .method(t.math, "Max")
        .param(int)
        .param(int)
        .returns(int)
        .body(max_int);
    module
        .method(t.math, "Max")
        .param(long)
        .param(long)
        .returns(long)
        .body(max_long);
    module
        .method(t.math, "Unwrap")
        .param(t.nullable_int)
        .returns(int)
        .body(unwrap);
    module
        .method(t.math, "NextColor")
        .param(t.color)
        .returns(t.color)
        .body(next_color);
    module
        .method(t.math, "SumPair")
        .param(t.int_long_pair)
        .returns(long)
        .body(sum_pair);
    let point = t.point;
    module
        .method(t.math, "Midpoint")
        .param(point)
        .param(point)
        .returns(point)
        .body(move |ctx, _, args| midpoint(ctx, args, point));
    module
        .method(t.math, "Reverse")
        .param(t.node)
        .returns(t.node)
        .body(reverse);
    module
        .method(t.math, "Fill")
        .param(int)
        .param(int)
        .returns(t.int_array)
        .body(fill);
    let validation = t.validation_exception;
    module
        .method(t.math, "Validate")
        .param(string)
        .returns(string)
        .body(move |ctx, _, args| validate(ctx, args, validation));
    module.method(t.math, "Crash").returns(int).body(crash);

    // Samples.Counter
    module.constructor(t.counter).param(int).body(counter_ctor);
    module
        .method(t.counter, "Increment")
        .instance()
        .returns(int)
        .body(increment);
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arg(ctx: &mut CallContext<'_>, args: &[Value], index: usize) -> Result<Value, Thrown> {
    match args.get(index) {
        Some(v) => Ok(v.clone()),
        None => {
            let ty = ctx.registry().well_known().argument;
            Err(ctx.throw(ty, &format!("Missing argument {}", index)))
        }
    }
}

fn int_arg(ctx: &mut CallContext<'_>, args: &[Value], index: usize) -> Result<i32, Thrown> {
    let value = arg(ctx, args, index)?;
    match value.as_i32() {
        Some(v) => Ok(v),
        None => {
            let ty = ctx.registry().well_known().argument;
            Err(ctx.throw(ty, &format!("Argument {} is not System.Int32", index)))
        }
    }
}

fn long_arg(ctx: &mut CallContext<'_>, args: &[Value], index: usize) -> Result<i64, Thrown> {
    let value = arg(ctx, args, index)?;
    match value.as_i64() {
        Some(v) => Ok(v),
        None => {
            let ty = ctx.registry().well_known().argument;
            Err(ctx.throw(ty, &format!("Argument {} is not System.Int64", index)))
        }
    }
}

fn receiver_of(ctx: &mut CallContext<'_>, receiver: Option<&Value>) -> Result<Value, Thrown> {
    match receiver {
        Some(v) => Ok(v.clone()),
        None => {
            let ty = ctx.registry().well_known().null_reference;
            Err(ctx.throw(ty, "Object reference not set to an instance of an object."))
        }
    }
}

// ============================================================================
// Samples.Math
// ============================================================================

fn sum(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    ctx.hit(0);
    let array = arg(ctx, args, 0)?;
    let elements = ctx.array_elements(&array)?;
    let mut total: i32 = 0;
    for element in &elements {
        ctx.hit(1);
        total = total.wrapping_add(element.as_i32().unwrap_or(0));
    }
    ctx.hit(2);
    Ok(Value::I32(total))
}

fn divide(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    ctx.hit(0);
    let a = int_arg(ctx, args, 0)?;
    let b = int_arg(ctx, args, 1)?;
    if b == 0 {
        ctx.hit(1);
        let ty = ctx.registry().well_known().divide_by_zero;
        return Err(ctx.throw(ty, "Attempted to divide by zero."));
    }
    match a.checked_div(b) {
        Some(q) => {
            ctx.hit(2);
            Ok(Value::I32(q))
        }
        None => {
            let ty = ctx.registry().well_known().overflow;
            Err(ctx.throw(ty, "Arithmetic operation resulted in an overflow."))
        }
    }
}

fn max_int(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let a = int_arg(ctx, args, 0)?;
    let b = int_arg(ctx, args, 1)?;
    Ok(Value::I32(a.max(b)))
}

fn max_long(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let a = long_arg(ctx, args, 0)?;
    let b = long_arg(ctx, args, 1)?;
    Ok(Value::I64(a.max(b)))
}

fn unwrap(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    match arg(ctx, args, 0)? {
        Value::NoValue | Value::Null => {
            let ty = ctx.registry().well_known().invalid_operation;
            Err(ctx.throw(ty, "Nullable object must have a value."))
        }
        value => Ok(value),
    }
}

fn next_color(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    match arg(ctx, args, 0)? {
        Value::Enum { ty, bits } => Ok(Value::Enum { ty, bits: (bits + 1) % 3 }),
        _ => {
            let ty = ctx.registry().well_known().argument;
            Err(ctx.throw(ty, "Argument 0 is not Samples.Color"))
        }
    }
}

fn sum_pair(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let pair = arg(ctx, args, 0)?;
    let first = ctx.field(&pair, "first")?.as_i64().unwrap_or(0);
    let second = ctx.field(&pair, "second")?.as_i64().unwrap_or(0);
    Ok(Value::I64(first.wrapping_add(second)))
}

fn midpoint(ctx: &mut CallContext<'_>, args: &[Value], point: TypeId) -> Result<Value, Thrown> {
    let a = arg(ctx, args, 0)?;
    let b = arg(ctx, args, 1)?;
    let mut coords = [0i64; 4];
    for (slot, (p, name)) in [(&a, "x"), (&a, "y"), (&b, "x"), (&b, "y")].into_iter().enumerate() {
        coords[slot] = ctx.field(p, name)?.as_i64().unwrap_or(0);
    }
    let x = ((coords[0] + coords[2]) / 2) as i32;
    let y = ((coords[1] + coords[3]) / 2) as i32;
    Ok(Value::Struct(Box::new(StructValue {
        ty: point,
        fields: vec![Value::I32(x), Value::I32(y)],
    })))
}

fn reverse(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let mut current = arg(ctx, args, 0)?;
    let mut previous = Value::Null;
    while !current.is_null() {
        let next = ctx.field(&current, "next")?;
        ctx.set_field(&current, "next", previous)?;
        previous = current;
        current = next;
    }
    Ok(previous)
}

fn fill(ctx: &mut CallContext<'_>, _: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let count = int_arg(ctx, args, 0)?;
    let value = int_arg(ctx, args, 1)?;
    if count < 0 {
        let ty = ctx.registry().well_known().argument;
        return Err(ctx.throw(ty, "Count must be non-negative."));
    }
    let int = ctx.registry().well_known().primitive(PrimitiveKind::I32);
    ctx.new_array(int, vec![Value::I32(value); count as usize])
}

fn validate(ctx: &mut CallContext<'_>, args: &[Value], exception: TypeId) -> Result<Value, Thrown> {
    let value = arg(ctx, args, 0)?;
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(Value::string(s.trim())),
        _ => {
            let thrown = ctx.throw(exception, "Value cannot be empty.");
            ctx.set_field(&Value::Ref(thrown.exception), "parameter", Value::string("value"))?;
            Err(thrown)
        }
    }
}

fn crash(_: &mut CallContext<'_>, _: Option<&Value>, _: &[Value]) -> Result<Value, Thrown> {
    panic!("native sample crashed")
}

// ============================================================================
// Samples.Counter
// ============================================================================

fn counter_ctor(ctx: &mut CallContext<'_>, receiver: Option<&Value>, args: &[Value]) -> Result<Value, Thrown> {
    let this = receiver_of(ctx, receiver)?;
    let start = int_arg(ctx, args, 0)?;
    ctx.set_field(&this, "count", Value::I32(start))?;
    let thread = ctx.thread_id() as i32;
    ctx.set_field(&this, "managedThreadId", Value::I32(thread))?;
    Ok(Value::Null)
}

fn increment(ctx: &mut CallContext<'_>, receiver: Option<&Value>, _: &[Value]) -> Result<Value, Thrown> {
    let this = receiver_of(ctx, receiver)?;
    let count = ctx.field(&this, "count")?.as_i32().unwrap_or(0).wrapping_add(1);
    ctx.set_field(&this, "count", Value::I32(count))?;
    Ok(Value::I32(count))
}
