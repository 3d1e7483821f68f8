// Static value kinds and the operator -> library call tables
//
// The VM has no arithmetic or comparison opcodes. Every operator becomes a call to a
// library function chosen by the static kinds of its operands.

use crate::kismet_compiler::ast::{BinaryOp, TypeRef, UnaryOp};
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Byte,
    Int,
    Int64,
    Float,
    String,
    Name,
    Text,
    Vector,
    Rotator,
    Transform,
    Object,
    Class,
    Interface,
    Struct,
    Array,
    Void,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ValueKind {
    pub fn from_type(ty: &TypeRef) -> ValueKind {
        match ty.name.as_str() {
            "bool" | "Boolean" => ValueKind::Bool,
            "byte" | "uint8" => ValueKind::Byte,
            "int" | "int32" => ValueKind::Int,
            "int64" => ValueKind::Int64,
            "float" | "double" => ValueKind::Float,
            "string" | "String" | "FString" => ValueKind::String,
            "Name" | "FName" => ValueKind::Name,
            "Text" | "FText" => ValueKind::Text,
            "Vector" | "FVector" => ValueKind::Vector,
            "Rotator" | "FRotator" => ValueKind::Rotator,
            "Transform" | "FTransform" => ValueKind::Transform,
            "void" => ValueKind::Void,
            "Struct" => match ty.argument.as_deref() {
                Some(inner) => match ValueKind::from_type(inner) {
                    kind @ (ValueKind::Vector | ValueKind::Rotator | ValueKind::Transform) => kind,
                    _ => ValueKind::Struct,
                },
                None => ValueKind::Struct,
            },
            "Class" => ValueKind::Class,
            "Interface" => ValueKind::Interface,
            "Array" => ValueKind::Array,
            _ => ValueKind::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryFunction {
    pub name: &'static str,
    pub library: &'static str,
    pub result: ValueKind,
}

const MATH: &str = "KismetMathLibrary";
const STRING: &str = "KismetStringLibrary";
const TEXT: &str = "KismetTextLibrary";

/// Library functions backing logical operators; operand kinds are not consulted
pub const BOOLEAN_AND: LibraryFunction = LibraryFunction {
    name: "BooleanAND",
    library: MATH,
    result: ValueKind::Bool,
};
pub const BOOLEAN_OR: LibraryFunction = LibraryFunction {
    name: "BooleanOR",
    library: MATH,
    result: ValueKind::Bool,
};
pub const BOOLEAN_NOT: LibraryFunction = LibraryFunction {
    name: "Not_PreBool",
    library: MATH,
    result: ValueKind::Bool,
};

type BinaryKey = (BinaryOp, ValueKind, ValueKind);

fn lib(name: &'static str, library: &'static str, result: ValueKind) -> LibraryFunction {
    LibraryFunction {
        name,
        library,
        result,
    }
}

fn insert_arithmetic(
    table: &mut IndexMap<BinaryKey, LibraryFunction>,
    kind: ValueKind,
    names: [&'static str; 5],
) {
    let ops = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::Modulo,
    ];
    for (op, name) in ops.into_iter().zip(names) {
        table.insert((op, kind, kind), lib(name, MATH, kind));
    }
}

fn insert_comparisons(
    table: &mut IndexMap<BinaryKey, LibraryFunction>,
    kind: ValueKind,
    library: &'static str,
    names: [&'static str; 6],
) {
    let ops = [
        BinaryOp::Less,
        BinaryOp::Greater,
        BinaryOp::LessEqual,
        BinaryOp::GreaterEqual,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
    ];
    for (op, name) in ops.into_iter().zip(names) {
        table.insert((op, kind, kind), lib(name, library, ValueKind::Bool));
    }
}

fn insert_equality(
    table: &mut IndexMap<BinaryKey, LibraryFunction>,
    kind: ValueKind,
    library: &'static str,
    equal: &'static str,
    not_equal: &'static str,
) {
    table.insert((BinaryOp::Equal, kind, kind), lib(equal, library, ValueKind::Bool));
    table.insert(
        (BinaryOp::NotEqual, kind, kind),
        lib(not_equal, library, ValueKind::Bool),
    );
}

lazy_static! {
    pub static ref BINARY_OPERATORS: IndexMap<BinaryKey, LibraryFunction> = {
        use BinaryOp::*;
        use ValueKind::*;
        let mut m = IndexMap::new();

        insert_arithmetic(&mut m, Int, ["Add_IntInt", "Subtract_IntInt", "Multiply_IntInt", "Divide_IntInt", "Percent_IntInt"]);
        insert_comparisons(&mut m, Int, MATH, ["Less_IntInt", "Greater_IntInt", "LessEqual_IntInt", "GreaterEqual_IntInt", "EqualEqual_IntInt", "NotEqual_IntInt"]);
        m.insert((BitAnd, Int, Int), lib("And_IntInt", MATH, Int));
        m.insert((BitOr, Int, Int), lib("Or_IntInt", MATH, Int));
        m.insert((BitXor, Int, Int), lib("Xor_IntInt", MATH, Int));

        insert_arithmetic(&mut m, Int64, ["Add_Int64Int64", "Subtract_Int64Int64", "Multiply_Int64Int64", "Divide_Int64Int64", "Percent_Int64Int64"]);
        insert_comparisons(&mut m, Int64, MATH, ["Less_Int64Int64", "Greater_Int64Int64", "LessEqual_Int64Int64", "GreaterEqual_Int64Int64", "EqualEqual_Int64Int64", "NotEqual_Int64Int64"]);
        m.insert((BitAnd, Int64, Int64), lib("And_Int64Int64", MATH, Int64));
        m.insert((BitOr, Int64, Int64), lib("Or_Int64Int64", MATH, Int64));
        m.insert((BitXor, Int64, Int64), lib("Xor_Int64Int64", MATH, Int64));

        insert_arithmetic(&mut m, Byte, ["Add_ByteByte", "Subtract_ByteByte", "Multiply_ByteByte", "Divide_ByteByte", "Percent_ByteByte"]);
        insert_comparisons(&mut m, Byte, MATH, ["Less_ByteByte", "Greater_ByteByte", "LessEqual_ByteByte", "GreaterEqual_ByteByte", "EqualEqual_ByteByte", "NotEqual_ByteByte"]);

        insert_arithmetic(&mut m, Float, ["Add_FloatFloat", "Subtract_FloatFloat", "Multiply_FloatFloat", "Divide_FloatFloat", "Percent_FloatFloat"]);
        insert_comparisons(&mut m, Float, MATH, ["Less_FloatFloat", "Greater_FloatFloat", "LessEqual_FloatFloat", "GreaterEqual_FloatFloat", "EqualEqual_FloatFloat", "NotEqual_FloatFloat"]);
        m.insert((Multiply, Int, Float), lib("Multiply_IntFloat", MATH, Float));

        m.insert((Add, Vector, Vector), lib("Add_VectorVector", MATH, Vector));
        m.insert((Subtract, Vector, Vector), lib("Subtract_VectorVector", MATH, Vector));
        m.insert((Multiply, Vector, Vector), lib("Multiply_VectorVector", MATH, Vector));
        m.insert((Divide, Vector, Vector), lib("Divide_VectorVector", MATH, Vector));
        m.insert((Add, Vector, Float), lib("Add_VectorFloat", MATH, Vector));
        m.insert((Subtract, Vector, Float), lib("Subtract_VectorFloat", MATH, Vector));
        m.insert((Multiply, Vector, Float), lib("Multiply_VectorFloat", MATH, Vector));
        m.insert((Divide, Vector, Float), lib("Divide_VectorFloat", MATH, Vector));
        m.insert((Add, Vector, Int), lib("Add_VectorInt", MATH, Vector));
        m.insert((Subtract, Vector, Int), lib("Subtract_VectorInt", MATH, Vector));
        m.insert((Multiply, Vector, Int), lib("Multiply_VectorInt", MATH, Vector));
        m.insert((Divide, Vector, Int), lib("Divide_VectorInt", MATH, Vector));
        insert_equality(&mut m, Vector, MATH, "EqualEqual_VectorVector", "NotEqual_VectorVector");

        m.insert((Multiply, Rotator, Float), lib("Multiply_RotatorFloat", MATH, Rotator));
        m.insert((Multiply, Rotator, Int), lib("Multiply_RotatorInt", MATH, Rotator));
        insert_equality(&mut m, Rotator, MATH, "EqualEqual_RotatorRotator", "NotEqual_RotatorRotator");
        insert_equality(&mut m, Transform, MATH, "EqualEqual_TransformTransform", "NotEqual_TransformTransform");

        insert_equality(&mut m, Bool, MATH, "EqualEqual_BoolBool", "NotEqual_BoolBool");
        m.insert((BitXor, Bool, Bool), lib("BooleanXOR", MATH, Bool));
        m.insert((BitAnd, Bool, Bool), lib("BooleanAND", MATH, Bool));
        m.insert((BitOr, Bool, Bool), lib("BooleanOR", MATH, Bool));

        insert_equality(&mut m, Object, MATH, "EqualEqual_ObjectObject", "NotEqual_ObjectObject");
        insert_equality(&mut m, Class, MATH, "EqualEqual_ClassClass", "NotEqual_ClassClass");
        insert_equality(&mut m, Interface, MATH, "EqualEqual_InterfaceInterface", "NotEqual_InterfaceInterface");
        insert_equality(&mut m, Name, MATH, "EqualEqual_NameName", "NotEqual_NameName");

        m.insert((Add, String, String), lib("Concat_StrStr", STRING, String));
        insert_equality(&mut m, String, STRING, "EqualEqual_StrStr", "NotEqual_StrStr");
        insert_equality(&mut m, Text, TEXT, "EqualEqual_TextText", "NotEqual_TextText");
        m
    };

    pub static ref UNARY_OPERATORS: IndexMap<(UnaryOp, ValueKind), LibraryFunction> = {
        let mut m = IndexMap::new();
        m.insert((UnaryOp::BitNot, ValueKind::Int), lib("Not_Int", MATH, ValueKind::Int));
        m.insert((UnaryOp::BitNot, ValueKind::Int64), lib("Not_Int64", MATH, ValueKind::Int64));
        m.insert((UnaryOp::Negate, ValueKind::Vector), lib("NegateVector", MATH, ValueKind::Vector));
        m.insert((UnaryOp::Negate, ValueKind::Rotator), lib("NegateRotator", MATH, ValueKind::Rotator));
        m
    };

    pub static ref CONVERSIONS: IndexMap<(ValueKind, ValueKind), LibraryFunction> = {
        use ValueKind::*;
        let mut m = IndexMap::new();
        m.insert((Int, Float), lib("Conv_IntToFloat", MATH, Float));
        m.insert((Float, Int), lib("FTrunc", MATH, Int));
        m.insert((Byte, Int), lib("Conv_ByteToInt", MATH, Int));
        m.insert((Int, Byte), lib("Conv_IntToByte", MATH, Byte));
        m.insert((Byte, Float), lib("Conv_ByteToFloat", MATH, Float));
        m.insert((Int, Bool), lib("Conv_IntToBool", MATH, Bool));
        m.insert((Bool, Int), lib("Conv_BoolToInt", MATH, Int));
        m.insert((Bool, Float), lib("Conv_BoolToFloat", MATH, Float));
        m.insert((Int, Int64), lib("Conv_IntToInt64", MATH, Int64));
        m.insert((Int64, Int), lib("Conv_Int64ToInt", MATH, Int));
        m.insert((Float, Vector), lib("Conv_FloatToVector", MATH, Vector));
        m.insert((Vector, Rotator), lib("Conv_VectorToRotator", MATH, Rotator));
        m.insert((Rotator, Vector), lib("Conv_RotatorToVector", MATH, Vector));
        m.insert((Int, String), lib("Conv_IntToString", STRING, String));
        m.insert((Float, String), lib("Conv_FloatToString", STRING, String));
        m.insert((Bool, String), lib("Conv_BoolToString", STRING, String));
        m.insert((Byte, String), lib("Conv_ByteToString", STRING, String));
        m.insert((Name, String), lib("Conv_NameToString", STRING, String));
        m.insert((Vector, String), lib("Conv_VectorToString", STRING, String));
        m.insert((Rotator, String), lib("Conv_RotatorToString", STRING, String));
        m.insert((Object, String), lib("Conv_ObjectToString", STRING, String));
        m.insert((String, Name), lib("Conv_StringToName", STRING, Name));
        m.insert((String, Int), lib("Conv_StringToInt", STRING, Int));
        m.insert((String, Float), lib("Conv_StringToFloat", STRING, Float));
        m.insert((String, Text), lib("Conv_StringToText", TEXT, Text));
        m.insert((Text, String), lib("Conv_TextToString", TEXT, String));
        m
    };
}

/// Library function for a binary operator over the given operand kinds
pub fn binary_operator(op: BinaryOp, left: ValueKind, right: ValueKind) -> Option<LibraryFunction> {
    match op {
        BinaryOp::LogicalAnd => Some(BOOLEAN_AND),
        BinaryOp::LogicalOr => Some(BOOLEAN_OR),
        _ => BINARY_OPERATORS.get(&(op, left, right)).copied(),
    }
}

pub fn unary_operator(op: UnaryOp, operand: ValueKind) -> Option<LibraryFunction> {
    match op {
        UnaryOp::Not => Some(BOOLEAN_NOT),
        _ => UNARY_OPERATORS.get(&(op, operand)).copied(),
    }
}

pub fn conversion(from: ValueKind, to: ValueKind) -> Option<LibraryFunction> {
    CONVERSIONS.get(&(from, to)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_declared_type() {
        assert_eq!(ValueKind::from_type(&TypeRef::plain("int")), ValueKind::Int);
        assert_eq!(ValueKind::from_type(&TypeRef::plain("Actor")), ValueKind::Object);
        assert_eq!(
            ValueKind::from_type(&TypeRef::generic("Struct", TypeRef::plain("Vector"))),
            ValueKind::Vector
        );
        assert_eq!(
            ValueKind::from_type(&TypeRef::generic("Struct", TypeRef::plain("HitResult"))),
            ValueKind::Struct
        );
        assert_eq!(
            ValueKind::from_type(&TypeRef::generic("Class", TypeRef::plain("Actor"))),
            ValueKind::Class
        );
    }

    #[test]
    fn test_logical_operators_ignore_kinds() {
        let and = binary_operator(BinaryOp::LogicalAnd, ValueKind::Int, ValueKind::Vector).unwrap();
        assert_eq!(and.name, "BooleanAND");
        let or = binary_operator(BinaryOp::LogicalOr, ValueKind::Bool, ValueKind::Bool).unwrap();
        assert_eq!(or.name, "BooleanOR");
        assert_eq!(unary_operator(UnaryOp::Not, ValueKind::Object).unwrap().name, "Not_PreBool");
    }

    #[test]
    fn test_mixed_kinds_are_directional() {
        assert_eq!(
            binary_operator(BinaryOp::Add, ValueKind::Vector, ValueKind::Int)
                .unwrap()
                .name,
            "Add_VectorInt"
        );
        assert!(binary_operator(BinaryOp::Add, ValueKind::Int, ValueKind::Vector).is_none());
    }
}
