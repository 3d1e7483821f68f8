// Code generation tests

use super::*;
use crate::kismet_compiler::bytecode::{ContextNode, SwitchCaseNode, CST_OBJECT_TO_BOOL};
use crate::kismet_compiler::bytecode_size::SizeModel;
use crate::kismet_compiler::package::{ExportEntry, FormatVersion, Package};
use crate::kismet_compiler::symbol_builder::SymbolTreeBuilder;
use crate::kismet_compiler::test_support::*;
use crate::kismet_compiler::KismetCompiler;
use test_log::test;

/// Absolute offset of every primary instruction
fn offsets(function: &FunctionRecord) -> Vec<u32> {
    let model = SizeModel::default();
    let mut offset = 0;
    function
        .instructions
        .iter()
        .map(|instruction| {
            let at = offset;
            offset += model.serialized_size(instruction);
            at as u32
        })
        .collect()
}

fn names(function: &FunctionRecord) -> Vec<&'static str> {
    function.instructions.iter().map(|i| i.name()).collect()
}

/// Object-table name of the function a call instruction targets
fn callee(package: &Package, instruction: &Instruction) -> String {
    match instruction {
        Instruction::CallMath { function, .. }
        | Instruction::FinalFunction { function, .. }
        | Instruction::LocalFinalFunction { function, .. } => package.full_name(*function),
        other => panic!("not a call: {}", other),
    }
}

fn test_class(members: Vec<Declaration>) -> Declaration {
    Declaration::Class(class("Test_C", None, members))
}

fn run(body: Vec<Stmt>) -> Declaration {
    Declaration::Procedure(procedure("Run", vec![], body))
}

fn switch_value(index: Expr, cases: Vec<(Expr, Expr)>, default: Expr) -> Expr {
    expr(ExprKind::SwitchValue {
        index: Box::new(index),
        cases: cases
            .into_iter()
            .map(|(value, result)| SwitchCase { value, result })
            .collect(),
        default: Box::new(default),
    })
}

#[test]
fn test_conditional_return_round_trip() {
    // void F(int a) { if (a > 0) return; x = a + 1; }
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("x", "int")),
        Declaration::Procedure(procedure(
            "F",
            vec![param("a", "int")],
            vec![
                if_then(binary(BinaryOp::Greater, ident("a"), int(0)), ret(None), None),
                exec(assign(ident("x"), binary(BinaryOp::Add, ident("a"), int(1)))),
            ],
        )),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("F").unwrap();
    let at = offsets(f);

    assert_eq!(
        names(f),
        vec!["EX_JumpIfNot", "EX_Jump", "EX_Let", "EX_Return", "EX_EndOfScript"]
    );
    match &f.instructions[0] {
        Instruction::JumpIfNot { target, condition } => {
            assert_eq!(*target, CodeOffset::Resolved(at[2]));
            assert_eq!(callee(&package, condition), "/Script/Engine.KismetMathLibrary.Greater_IntInt");
        }
        other => panic!("unexpected {}", other),
    }
    // The early return goes through the single epilogue
    assert_eq!(f.instructions[1], Instruction::Jump(CodeOffset::Resolved(at[3])));
    match &f.instructions[2] {
        Instruction::Let {
            variable, expression, ..
        } => {
            assert!(matches!(**variable, Instruction::InstanceVariable(_)));
            assert_eq!(callee(&package, expression), "/Script/Engine.KismetMathLibrary.Add_IntInt");
        }
        other => panic!("unexpected {}", other),
    }
    assert_eq!(f.instructions[3], Instruction::Return(Box::new(Instruction::Nothing)));
}

#[test]
fn test_locals_shadow_fields_only_under_implicit_this() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("x", "int")),
        run(vec![
            local("x", "int"),
            exec(assign(ident("x"), int(1))),
            exec(assign(member(this(), ident("x")), int(2))),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    let target = |i: usize| match &f.instructions[i] {
        Instruction::Let { variable, .. } => (**variable).clone(),
        other => panic!("unexpected {}", other),
    };
    assert!(matches!(target(0), Instruction::LocalVariable(_)));
    assert!(matches!(target(1), Instruction::InstanceVariable(_)));
}

#[test]
fn test_every_function_ends_with_one_return() {
    let mut area = procedure("Area", vec![param("W", "int")], vec![ret(Some(ident("W")))]);
    area.return_type = Some(TypeRef::plain("int"));
    let source = unit(vec![
        Declaration::Procedure(area),
        Declaration::Procedure(procedure("Empty", vec![], vec![])),
        Declaration::Procedure(procedure("Noop", vec![], vec![exec(call("EX_Nothing", vec![]))])),
        Declaration::Procedure(procedure(
            "Raw",
            vec![],
            vec![
                exec(call("EX_Return", vec![call("EX_Nothing", vec![])])),
                exec(call("EX_EndOfScript", vec![])),
            ],
        )),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();

    for function in script.all_functions() {
        let n = function.instructions.len();
        assert!(n >= 2, "{} is too short", function.name);
        assert_eq!(function.instructions[n - 2].name(), "EX_Return", "{}", function.name);
        assert_eq!(function.instructions[n - 1], Instruction::EndOfScript, "{}", function.name);
        let returns = function.instructions.iter().filter(|i| i.name() == "EX_Return").count();
        assert_eq!(returns, 1, "{}", function.name);
    }

    let area = script.function("Area").unwrap();
    assert_eq!(names(area), vec!["EX_Let", "EX_Return", "EX_EndOfScript"]);
    assert!(matches!(
        &area.instructions[1],
        Instruction::Return(value) if matches!(**value, Instruction::LocalOutVariable(_))
    ));
    assert_eq!(script.function("Empty").unwrap().instructions.len(), 2);
    assert_eq!(script.function("Raw").unwrap().instructions.len(), 2);
}

#[test]
fn test_return_value_without_result_type_is_rejected() {
    let source = unit(vec![Declaration::Procedure(procedure(
        "Run",
        vec![],
        vec![ret(Some(int(1)))],
    ))]);
    let mut package = engine_package();
    let result = compile(&source, &mut package);
    assert!(matches!(result, Err(CompilerError::UnexpectedNode { .. })));
}

#[test]
fn test_emit_accumulates_code_offsets() {
    let mut package = engine_package();
    let options = CompilerOptions::default();
    let source = unit(vec![run(vec![])]);
    let tree = SymbolTreeBuilder::new(&mut package, &options).build(&source).unwrap();
    let procedure = tree.globals.lookup(&tree.symbols, "Run", None).unwrap();

    let mut compiler = ScriptCompiler::new(&mut package, &options, tree);
    let label = compiler.symbols.create(
        "later",
        SymbolKind::Label { code_offset: None },
        Some(procedure),
        false,
        at(1),
    );
    compiler.function = Some(FunctionCompilationState {
        procedure,
        code_offset: 0,
        contexts: Vec::new(),
        return_label: label,
    });
    let emitted = vec![
        Instruction::IntConst(7),
        Instruction::StringConst("hello".to_string()),
        Instruction::Jump(CodeOffset::Pending(label)),
        Instruction::EndOfScript,
    ];
    for instruction in emitted.clone() {
        compiler.emit("test", at(1), instruction).unwrap();
    }

    let model = SizeModel::default();
    let state = compiler.function.as_ref().unwrap();
    assert_eq!(state.contexts[0].code_offset, 0);
    for pair in state.contexts.windows(2) {
        assert_eq!(
            pair[1].code_offset,
            pair[0].code_offset + model.serialized_size(&pair[0].instructions[0])
        );
    }
    let total: usize = emitted.iter().map(|i| model.serialized_size(i)).sum();
    assert_eq!(state.code_offset, total);
    assert_eq!(state.contexts[2].referenced_labels, vec![label]);
    assert!(state.contexts[0].referenced_labels.is_empty());
}

#[test]
fn test_unresolved_label_is_an_internal_error() {
    let mut package = engine_package();
    let options = CompilerOptions::default();
    let source = unit(vec![run(vec![])]);
    let tree = SymbolTreeBuilder::new(&mut package, &options).build(&source).unwrap();
    let procedure = tree.globals.lookup(&tree.symbols, "Run", None).unwrap();

    let mut compiler = ScriptCompiler::new(&mut package, &options, tree);
    compiler.function = Some(FunctionCompilationState {
        procedure,
        code_offset: 0,
        contexts: Vec::new(),
        return_label: procedure,
    });
    let dangling = compiler.synthetic_label("dangling", at(1));
    compiler
        .emit("test", at(1), Instruction::Jump(CodeOffset::Pending(dangling)))
        .unwrap();
    let mut instructions = compiler.function.take().unwrap().instructions();

    match compiler.fixup_function(&mut instructions) {
        Err(CompilerError::InternalError(message)) => assert!(message.contains("COMPILER BUG")),
        other => panic!("expected internal error, got {:?}", other),
    }
    let mut as_value = vec![Instruction::LabelOffset(CodeOffset::Pending(dangling))];
    assert!(matches!(
        compiler.fixup_function(&mut as_value),
        Err(CompilerError::InternalError(_))
    ));
}

#[test]
fn test_labels_resolve_forward_and_backward() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("bDone", "bool")),
        run(vec![
            label("Top"),
            if_then(not(ident("bDone")), goto("Top"), None),
            goto("End"),
            exec(call("EX_Nothing", vec![])),
            label("End"),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();
    let at = offsets(f);

    assert_eq!(
        names(f),
        vec!["EX_JumpIfNot", "EX_Jump", "EX_Nothing", "EX_Return", "EX_EndOfScript"]
    );
    // `if (!x) goto L` is one conditional jump on x itself
    match &f.instructions[0] {
        Instruction::JumpIfNot { target, condition } => {
            assert_eq!(*target, CodeOffset::Resolved(0));
            assert!(matches!(**condition, Instruction::InstanceVariable(_)));
        }
        other => panic!("unexpected {}", other),
    }
    assert_eq!(f.instructions[1], Instruction::Jump(CodeOffset::Resolved(at[3])));
    for instruction in &f.instructions {
        assert!(pending_labels(&mut instruction.clone()).is_empty());
    }
}

#[test]
fn test_goto_unknown_label_fails() {
    let source = unit(vec![run(vec![goto("Nowhere")])]);
    let mut package = engine_package();
    match compile(&source, &mut package) {
        Err(CompilerError::UnknownSymbol { name, .. }) => assert_eq!(name, "Nowhere"),
        other => panic!("expected unknown symbol, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_if_else_jumps() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("b", "bool")),
        Declaration::Variable(var("n", "int")),
        run(vec![if_then(
            ident("b"),
            exec(assign(ident("n"), int(1))),
            Some(exec(assign(ident("n"), int(2)))),
        )]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();
    let at = offsets(f);

    assert_eq!(
        names(f),
        vec!["EX_JumpIfNot", "EX_Let", "EX_Jump", "EX_Let", "EX_Return", "EX_EndOfScript"]
    );
    assert!(matches!(
        &f.instructions[0],
        Instruction::JumpIfNot { target, .. } if *target == CodeOffset::Resolved(at[3])
    ));
    assert_eq!(f.instructions[2], Instruction::Jump(CodeOffset::Resolved(at[4])));
}

#[test]
fn test_operators_map_to_library_calls() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("f", "float")),
        Declaration::Variable(var("n", "int")),
        Declaration::Variable(var("s", "string")),
        Declaration::Variable(var("b", "bool")),
        Declaration::Variable(typed_var("v", TypeRef::generic("Struct", TypeRef::plain("Vector")))),
        run(vec![
            exec(binary(BinaryOp::Add, ident("f"), ident("f"))),
            exec(binary(BinaryOp::Multiply, ident("v"), ident("f"))),
            exec(binary(BinaryOp::Multiply, ident("n"), ident("f"))),
            exec(binary(BinaryOp::Add, ident("s"), ident("s"))),
            exec(binary(BinaryOp::LogicalAnd, ident("b"), ident("b"))),
            exec(binary(BinaryOp::Modulo, ident("n"), int(3))),
            exec(not(ident("b"))),
            exec(expr(ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(ident("n")),
            })),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    let expected = [
        "KismetMathLibrary.Add_FloatFloat",
        "KismetMathLibrary.Multiply_VectorFloat",
        "KismetMathLibrary.Multiply_IntFloat",
        "KismetStringLibrary.Concat_StrStr",
        "KismetMathLibrary.BooleanAND",
        "KismetMathLibrary.Percent_IntInt",
        "KismetMathLibrary.Not_PreBool",
        "KismetMathLibrary.Subtract_IntInt",
    ];
    for (instruction, name) in f.instructions.iter().zip(expected) {
        assert_eq!(callee(&package, instruction), format!("/Script/Engine.{}", name));
    }
    // Negation is zero minus the operand
    match &f.instructions[7] {
        Instruction::CallMath { parameters, .. } => assert_eq!(parameters[0], Instruction::IntConst(0)),
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_compound_forms_and_indexing() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("n", "int")),
        Declaration::Variable(typed_var("Items", TypeRef::generic("Array", TypeRef::plain("int")))),
        run(vec![
            exec(expr(ExprKind::CompoundAssign {
                op: BinaryOp::Add,
                target: Box::new(ident("n")),
                value: Box::new(int(2)),
            })),
            exec(expr(ExprKind::Increment {
                operand: Box::new(ident("n")),
                prefix: false,
            })),
            exec(assign(
                ident("n"),
                expr(ExprKind::Index {
                    array: Box::new(ident("Items")),
                    index: Box::new(int(0)),
                }),
            )),
            stmt(StmtKind::Goto(GotoTarget::Computed(ident("n")))),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    for i in 0..2 {
        match &f.instructions[i] {
            Instruction::Let { expression, .. } => {
                assert_eq!(callee(&package, expression), "/Script/Engine.KismetMathLibrary.Add_IntInt")
            }
            other => panic!("unexpected {}", other),
        }
    }
    assert!(matches!(
        &f.instructions[2],
        Instruction::Let { expression, .. } if matches!(**expression, Instruction::ArrayGetByRef { .. })
    ));
    assert!(matches!(
        &f.instructions[3],
        Instruction::ComputedJump(target) if matches!(**target, Instruction::InstanceVariable(_))
    ));
}

#[test]
fn test_unsupported_operator_names_both_kinds() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("b", "bool")),
        Declaration::Variable(typed_var("v", TypeRef::generic("Struct", TypeRef::plain("Vector")))),
        run(vec![exec(binary(BinaryOp::Add, ident("b"), ident("v")))]),
    ])]);
    let mut package = engine_package();
    match compile(&source, &mut package) {
        Err(CompilerError::UnsupportedOperator {
            operator, left, right, ..
        }) => {
            assert_eq!(operator, "+");
            assert_eq!(left, "Bool");
            assert_eq!(right, "Vector");
        }
        other => panic!("expected unsupported operator, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_library_functions_are_imported_once() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("n", "int")),
        run(vec![
            exec(binary(BinaryOp::Multiply, ident("n"), int(2))),
            exec(binary(BinaryOp::Multiply, ident("n"), int(3))),
            exec(binary(BinaryOp::Greater, ident("n"), int(1))),
        ]),
    ])]);
    let mut package = engine_package();
    let imports_before = package.imports.len();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    // Package and library class entries are reused; only the function is new
    assert_eq!(package.imports.len(), imports_before + 1);
    let function = |i: usize| match &f.instructions[i] {
        Instruction::CallMath { function, .. } => *function,
        other => panic!("unexpected {}", other),
    };
    assert_eq!(function(0), function(1));
    assert_eq!(
        package.full_name(function(0)),
        "/Script/Engine.KismetMathLibrary.Multiply_IntInt"
    );
    assert_eq!(function(2), PackageIndex::from_import(3));
}

#[test]
fn test_switch_value_labels_land_on_case_boundaries() {
    let switch = switch_value(
        ident("n"),
        vec![(int(0), int(10)), (int(1), int(20))],
        int(30),
    );
    let intrinsic = call(
        "EX_SwitchValue",
        vec![ident("n"), int(30), int(0), int(10), int(1), int(20)],
    );
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("n", "int")),
        Declaration::Procedure(procedure("FromSyntax", vec![], vec![exec(assign(ident("n"), switch))])),
        Declaration::Procedure(procedure("FromIntrinsic", vec![], vec![exec(assign(ident("n"), intrinsic))])),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("FromSyntax").unwrap();

    let model = SizeModel::default();
    let assignment = &f.instructions[0];
    let switch_start = model.layout(assignment).child_starts[1];
    let Instruction::Let { expression, .. } = assignment else {
        panic!("unexpected {}", assignment);
    };
    let boundaries = model.switch_boundaries(expression, switch_start);
    match &**expression {
        Instruction::SwitchValue {
            end_goto_offset,
            cases,
            ..
        } => {
            assert_eq!(*end_goto_offset, CodeOffset::Resolved(boundaries[0] as u32));
            assert_eq!(boundaries[0], model.serialized_size(assignment));
            let next: Vec<CodeOffset> = cases.iter().map(|c: &SwitchCaseNode| c.next_offset).collect();
            assert_eq!(
                next,
                vec![
                    CodeOffset::Resolved(boundaries[1] as u32),
                    CodeOffset::Resolved(boundaries[2] as u32)
                ]
            );
        }
        other => panic!("unexpected {}", other),
    }

    let g = script.function("FromIntrinsic").unwrap();
    assert_eq!(f.instructions[0], g.instructions[0]);
}

fn door_and_holder() -> Vec<Declaration> {
    vec![
        Declaration::Class(class(
            "Door_C",
            None,
            vec![Declaration::Variable(var("Speed", "float"))],
        )),
        test_class(vec![
            Declaration::Variable(typed_var("Door", TypeRef::generic("Object", TypeRef::plain("Door_C")))),
            run(vec![
                exec(member(ident("Door"), ident("Speed"))),
                exec(assign(member(ident("Door"), ident("Speed")), float(1.0))),
            ]),
        ]),
    ]
}

#[test]
fn test_context_carries_member_size_and_rvalue() {
    let source = unit(door_and_holder());
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();
    let model = SizeModel::default();

    let node = match &f.instructions[0] {
        Instruction::Context(node) => node,
        other => panic!("unexpected {}", other),
    };
    assert!(matches!(*node.object, Instruction::InstanceVariable(_)));
    assert_eq!(node.skip_size, Some(model.serialized_size(&node.member) as u32));
    assert_eq!(Some(&node.r_value), node.member.property_pointer());
    assert_eq!(node.r_value.path, vec!["Speed".to_string()]);

    // Assigning through a context writes the member's property
    match &f.instructions[1] {
        Instruction::Let { value, variable, .. } => {
            assert_eq!(value.path, vec!["Speed".to_string()]);
            assert!(matches!(**variable, Instruction::Context(_)));
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_set_array_shape_follows_format_version() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(typed_var("Items", TypeRef::generic("Array", TypeRef::plain("int")))),
        run(vec![exec(assign(
            ident("Items"),
            expr(ExprKind::InitializerList(vec![int(1), int(2)])),
        ))]),
    ])]);

    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    match &script.function("Run").unwrap().instructions[0] {
        Instruction::SetArray {
            assigning_property: Some(target),
            inner_property: None,
            elements,
        } => {
            assert!(matches!(**target, Instruction::InstanceVariable(_)));
            assert_eq!(elements.len(), 2);
        }
        other => panic!("unexpected {}", other),
    }

    let legacy = FormatVersion {
        object_version: 200,
        field_path_properties: false,
    };
    let mut package = Package::new("/Game/Test", legacy);
    let script = compile(&source, &mut package).unwrap();
    match &script.function("Run").unwrap().instructions[0] {
        Instruction::SetArray {
            assigning_property: None,
            inner_property: Some(inner),
            ..
        } => assert_eq!(package.full_name(*inner), "Test_C.Items"),
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_bool_targets_use_let_bool() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("b", "bool")),
        run(vec![exec(assign(ident("b"), boolean(true)))]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    assert!(matches!(
        script.function("Run").unwrap().instructions[0],
        Instruction::LetBool { .. }
    ));
}

#[test]
fn test_casts() {
    let source = unit(vec![
        Declaration::Class(class("Door_C", None, vec![])),
        test_class(vec![
            Declaration::Variable(var("f", "float")),
            Declaration::Variable(var("s", "string")),
            Declaration::Variable(var("obj", "Actor")),
            run(vec![
                exec(cast(TypeRef::plain("int"), ident("f"))),
                exec(cast(TypeRef::plain("Door_C"), ident("obj"))),
                exec(cast(TypeRef::plain("bool"), ident("obj"))),
                exec(cast(TypeRef::plain("float"), ident("f"))),
            ]),
        ]),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    assert_eq!(callee(&package, &f.instructions[0]), "/Script/Engine.KismetMathLibrary.FTrunc");
    match &f.instructions[1] {
        Instruction::DynamicCast { class, .. } => assert_eq!(package.full_name(*class), "Door_C"),
        other => panic!("unexpected {}", other),
    }
    assert!(matches!(
        &f.instructions[2],
        Instruction::PrimitiveCast { conversion, .. } if *conversion == CST_OBJECT_TO_BOOL
    ));
    assert!(matches!(f.instructions[3], Instruction::InstanceVariable(_)));

    let bad = unit(vec![test_class(vec![
        Declaration::Variable(var("s", "string")),
        run(vec![exec(cast(TypeRef::plain("Vector"), ident("s")))]),
    ])]);
    let mut package = engine_package();
    assert!(matches!(
        compile(&bad, &mut package),
        Err(CompilerError::UnsupportedCast { .. })
    ));
}

fn unknown_owner_unit(extra: Vec<Declaration>) -> CompilationUnit {
    let mut declarations = vec![Declaration::Class(class(
        "Door_C",
        None,
        vec![Declaration::Variable(var("Speed", "float"))],
    ))];
    declarations.extend(extra);
    declarations.push(test_class(vec![run(vec![exec(member(
        ident("SomeDoor"),
        ident("Speed"),
    ))])]));
    unit(declarations)
}

#[test]
fn test_unknown_owner_fails_in_strict_mode() {
    let mut package = engine_package();
    match compile(&unknown_owner_unit(vec![]), &mut package) {
        Err(CompilerError::UnknownSymbol { name, .. }) => assert_eq!(name, "SomeDoor"),
        other => panic!("expected unknown symbol, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_lenient_mode_picks_the_single_declaring_class() {
    let mut package = engine_package();
    let script = compile_with(&unknown_owner_unit(vec![]), &mut package, CompilerOptions::lenient()).unwrap();
    match &script.function("Run").unwrap().instructions[0] {
        Instruction::Context(node) => match *node.object {
            Instruction::ObjectConst(index) => assert_eq!(package.full_name(index), "Door_C"),
            ref other => panic!("unexpected object {}", other),
        },
        other => panic!("unexpected {}", other),
    }

    let window = Declaration::Class(class(
        "Window_C",
        None,
        vec![Declaration::Variable(var("Speed", "float"))],
    ));
    let mut package = engine_package();
    match compile_with(&unknown_owner_unit(vec![window]), &mut package, CompilerOptions::lenient()) {
        Err(CompilerError::AmbiguousMemberContext { member, classes, .. }) => {
            assert_eq!(member, "Speed");
            assert_eq!(classes.len(), 2);
        }
        other => panic!("expected ambiguity, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_call_dispatch() {
    let mut foo = procedure("Foo", vec![param("Amount", "int")], vec![]);
    foo.modifiers.is_virtual = true;
    let mut util = procedure("Util", vec![], vec![]);
    util.modifiers.is_static = true;
    let source = unit(vec![
        Declaration::Class(class(
            "Base_C",
            None,
            vec![Declaration::Procedure(foo), Declaration::Procedure(util)],
        )),
        Declaration::Class(class(
            "Test_C",
            Some("Base_C"),
            vec![
                Declaration::Variable(var("n", "int")),
                Declaration::Variable(typed_var("Other", TypeRef::generic("Object", TypeRef::plain("Base_C")))),
                run(vec![
                    exec(call("Foo", vec![int(1)])),
                    exec(member(expr(ExprKind::Base), call("Foo", vec![int(2)]))),
                    exec(member(ident("Test_C"), call("Foo", vec![int(3)]))),
                    exec(call("Util", vec![])),
                    exec(call("Missing", vec![])),
                    exec(member(ident("Other"), call("Foo", vec![ident("n")]))),
                ]),
            ],
        )),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    assert!(matches!(
        &f.instructions[0],
        Instruction::LocalVirtualFunction { name, .. } if name == "Foo"
    ));
    assert_eq!(callee(&package, &f.instructions[1]), "Base_C.Foo");
    assert_eq!(f.instructions[1].name(), "EX_LocalFinalFunction");
    // Naming the own class forces a non-virtual call
    assert_eq!(f.instructions[2].name(), "EX_LocalFinalFunction");
    assert_eq!(callee(&package, &f.instructions[3]), "Base_C.Util");
    assert_eq!(f.instructions[3].name(), "EX_CallMath");
    assert!(matches!(
        &f.instructions[4],
        Instruction::LocalVirtualFunction { name, .. } if name == "Missing"
    ));
    match &f.instructions[5] {
        Instruction::Context(node) => match &*node.member {
            Instruction::VirtualFunction { name, parameters } => {
                assert_eq!(name, "Foo");
                // Arguments bind in the caller's class, not in Other's
                assert!(matches!(parameters[0], Instruction::InstanceVariable(_)));
            }
            other => panic!("unexpected member {}", other),
        },
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_ubergraph_locals_written_from_siblings_use_persistent_frame() {
    let source = unit(vec![test_class(vec![
        Declaration::Procedure(procedure(
            "ExecuteUbergraph_Test",
            vec![param("EntryPoint", "int")],
            vec![local("K2Node_Count", "int")],
        )),
        Declaration::Procedure(procedure(
            "Tick",
            vec![],
            vec![exec(assign(ident("K2Node_Count"), int(1)))],
        )),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    match &script.function("Tick").unwrap().instructions[0] {
        Instruction::LetValueOnPersistentFrame { destination, .. } => {
            assert_eq!(destination.path, vec!["K2Node_Count".to_string()]);
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_intrinsics() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("b", "bool")),
        run(vec![
            exec(call("EX_Assert", vec![int(12), boolean(true), ident("b")])),
            exec(call("EX_ObjectConst", vec![string("<null>")])),
            exec(call("EX_CallMath", vec![string("Add_IntInt"), int(1), int(2)])),
            exec(call(
                "EX_VectorConst",
                vec![float(1.0), expr(ExprKind::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(float(2.0)),
                }), int(3)],
            )),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    match &f.instructions[0] {
        Instruction::Assert {
            line,
            debug_only,
            condition,
        } => {
            assert_eq!(*line, 12);
            assert!(*debug_only);
            assert!(matches!(**condition, Instruction::InstanceVariable(_)));
        }
        other => panic!("unexpected {}", other),
    }
    assert_eq!(f.instructions[1], Instruction::ObjectConst(PackageIndex::NULL));
    assert_eq!(callee(&package, &f.instructions[2]), "/Script/Engine.KismetMathLibrary.Add_IntInt");
    assert_eq!(
        f.instructions[3],
        Instruction::VectorConst {
            x: 1.0,
            y: -2.0,
            z: 3.0
        }
    );
}

#[test]
fn test_intrinsic_argument_errors() {
    for body in [
        exec(call("EX_Let", vec![int(1)])),
        exec(call("EX_Bogus", vec![])),
        exec(call("EX_ByteConst", vec![int(300)])),
    ] {
        let source = unit(vec![run(vec![body])]);
        let mut package = engine_package();
        assert!(matches!(
            compile(&source, &mut package),
            Err(CompilerError::IntrinsicArgument { .. })
        ));
    }
}

#[test]
fn test_stacks_unwind_after_errors() {
    let mut package = engine_package();
    let options = CompilerOptions::default();
    // The failure happens while the context and r-value stacks are in use
    let source = unit(vec![
        Declaration::Class(class(
            "Door_C",
            None,
            vec![Declaration::Variable(var("Speed", "float"))],
        )),
        test_class(vec![
            Declaration::Variable(typed_var("Door", TypeRef::generic("Object", TypeRef::plain("Door_C")))),
            run(vec![block(vec![exec(assign(
                member(ident("Door"), ident("Speed")),
                ident("Nope"),
            ))])]),
        ]),
    ]);
    let tree = SymbolTreeBuilder::new(&mut package, &options).build(&source).unwrap();
    let mut compiler = ScriptCompiler::new(&mut package, &options, tree);

    assert!(matches!(
        compiler.compile_unit(&source),
        Err(CompilerError::UnknownSymbol { .. })
    ));
    assert!(compiler.contexts.is_empty());
    assert!(compiler.rvalues.is_empty());
    assert_eq!(compiler.scopes.depth(), 1);
    assert!(compiler.current_class.is_none());
}

fn ubergraph_and_stub(stub_first: bool) -> CompilationUnit {
    let ubergraph = Declaration::Procedure(procedure(
        "ExecuteUbergraph_Test",
        vec![param("EntryPoint", "int")],
        vec![exec(int(0)), label("Entry_12"), exec(int(1))],
    ));
    let stub = Declaration::Procedure(procedure(
        "Stub",
        vec![],
        vec![
            exec(call("EX_SkipOffsetConst", vec![ident("Entry_12")])),
            exec(call("ExecuteUbergraph_Test", vec![ident("Entry_12")])),
        ],
    ));
    let members = if stub_first {
        vec![stub, ubergraph]
    } else {
        vec![ubergraph, stub]
    };
    unit(vec![test_class(members)])
}

#[test]
fn test_ubergraph_labels_resolve_in_either_declaration_order() {
    for stub_first in [false, true] {
        let source = ubergraph_and_stub(stub_first);
        let mut package = engine_package();
        let script = compile(&source, &mut package).unwrap();
        let entry = offsets(script.function("ExecuteUbergraph_Test").unwrap())[1];
        assert_eq!(entry, 5);

        let stub = script.function("Stub").unwrap();
        assert_eq!(stub.instructions[0], Instruction::SkipOffsetConst(CodeOffset::Resolved(entry)));
        // The entry point passed as an argument is a plain integer
        match &stub.instructions[1] {
            Instruction::LocalFinalFunction { parameters, .. } => {
                assert_eq!(parameters, &vec![Instruction::IntConst(entry as i32)]);
            }
            other => panic!("unexpected {}", other),
        }
    }
}

#[test]
fn test_label_value_is_sized_as_an_int_constant() {
    let model = SizeModel::default();
    let placeholder = Instruction::LabelOffset(CodeOffset::Pending(0));
    assert_eq!(placeholder.name(), "EX_IntConst");
    assert_eq!(
        model.serialized_size(&placeholder),
        model.serialized_size(&Instruction::IntConst(0))
    );
    assert_eq!(pending_labels(&mut placeholder.clone()), vec![0]);
}

#[test]
fn test_sibling_blocks_may_reuse_a_local_name() {
    let source = unit(vec![test_class(vec![run(vec![
        block(vec![local("t", "int"), exec(assign(ident("t"), int(1)))]),
        block(vec![local("t", "int"), exec(assign(ident("t"), int(2)))]),
    ])])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    let written: Vec<String> = f.instructions[..2]
        .iter()
        .map(|instruction| match instruction {
            Instruction::Let { value, .. } => value.path.join("."),
            other => panic!("unexpected {}", other),
        })
        .collect();
    assert_eq!(written[0], "t");
    // Both locals are properties of Run, so the second one gets its own name
    assert!(written[1].starts_with("t$"), "{}", written[1]);
}

#[test]
fn test_duplicate_local_in_one_block_is_rejected() {
    let source = unit(vec![run(vec![block(vec![local("t", "int"), local("t", "int")])])]);
    let mut package = engine_package();
    match compile(&source, &mut package) {
        Err(CompilerError::DuplicateSymbol { name, .. }) => assert_eq!(name, "t"),
        other => panic!("expected duplicate symbol, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_engine_struct_members_are_owned_by_an_import() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(typed_var("Hinge", TypeRef::generic("Struct", TypeRef::plain("Vector")))),
        run(vec![
            exec(assign(member(ident("Hinge"), ident("X")), float(2.0))),
            exec(assign(member(ident("Hinge"), ident("Y")), float(3.0))),
        ]),
    ])]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    let mut owners = Vec::new();
    for instruction in &f.instructions[..2] {
        match instruction {
            Instruction::Let { variable, .. } => match &**variable {
                Instruction::StructMemberContext { member, .. } => owners.push(member.owner),
                other => panic!("unexpected target {}", other),
            },
            other => panic!("unexpected {}", other),
        }
    }
    assert!(!owners[0].is_null());
    assert_eq!(owners[0], owners[1]);
    assert_eq!(package.full_name(owners[0]), "/Script/CoreUObject.Vector");
    let vector: Vec<_> = package.imports().iter().filter(|i| i.object_name == "Vector").collect();
    assert_eq!(vector.len(), 1);
    assert_eq!(vector[0].class_name, "ScriptStruct");
}

#[test]
fn test_struct_variable_members_use_struct_member_context() {
    let mut pose = class("Pose_S", None, vec![Declaration::Variable(var("Angle", "float"))]);
    pose.kind = ClassKind::Struct;
    let source = unit(vec![
        Declaration::Class(pose),
        test_class(vec![
            Declaration::Variable(typed_var("Pose", TypeRef::generic("Struct", TypeRef::plain("Pose_S")))),
            run(vec![exec(member(ident("Pose"), ident("Angle")))]),
        ]),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();

    match &script.function("Run").unwrap().instructions[0] {
        Instruction::StructMemberContext {
            member,
            struct_expression,
        } => {
            assert_eq!(member.path, vec!["Angle".to_string()]);
            assert_eq!(package.full_name(member.owner), "Pose_S");
            match &**struct_expression {
                Instruction::InstanceVariable(p) => assert_eq!(p.path, vec!["Pose".to_string()]),
                other => panic!("unexpected struct expression {}", other),
            }
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_interface_members_use_interface_context() {
    let mut usable = class(
        "Usable_I",
        None,
        vec![Declaration::Procedure(external_procedure(
            "Use",
            Modifiers {
                is_virtual: true,
                ..Modifiers::default()
            },
        ))],
    );
    usable.kind = ClassKind::Interface;
    let source = unit(vec![
        Declaration::Class(usable),
        test_class(vec![
            Declaration::Variable(typed_var("Target", TypeRef::generic("Interface", TypeRef::plain("Usable_I")))),
            run(vec![exec(member(ident("Target"), call("Use", vec![])))]),
        ]),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();

    match &script.function("Run").unwrap().instructions[0] {
        Instruction::Context(node) => {
            match &*node.object {
                Instruction::InterfaceContext(inner) => {
                    assert!(matches!(**inner, Instruction::InstanceVariable(_)))
                }
                other => panic!("unexpected object {}", other),
            }
            assert!(matches!(
                &*node.member,
                Instruction::VirtualFunction { name, .. } if name == "Use"
            ));
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_class_references_use_class_context() {
    let source = unit(vec![
        Declaration::Class(class(
            "Door_C",
            None,
            vec![Declaration::Variable(var("Speed", "float"))],
        )),
        test_class(vec![
            Declaration::Variable(typed_var("Kind", TypeRef::generic("Class", TypeRef::plain("Door_C")))),
            run(vec![exec(member(ident("Kind"), ident("Speed")))]),
        ]),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let model = SizeModel::default();

    match &script.function("Run").unwrap().instructions[0] {
        Instruction::ClassContext(node) => {
            match &*node.object {
                Instruction::InstanceVariable(p) => assert_eq!(p.path, vec!["Kind".to_string()]),
                other => panic!("unexpected object {}", other),
            }
            assert_eq!(node.r_value.path, vec!["Speed".to_string()]);
            assert_eq!(node.skip_size, Some(model.serialized_size(&node.member) as u32));
        }
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_external_objects_are_addressed_by_object_constant() {
    let mut open = procedure("Open", vec![], vec![]);
    open.modifiers.is_virtual = true;
    let mut the_door = typed_var("TheDoor", TypeRef::plain("Door_C"));
    the_door.modifiers.is_external = true;
    let source = unit(vec![
        Declaration::Class(class(
            "Door_C",
            None,
            vec![
                Declaration::Variable(var("Speed", "float")),
                Declaration::Procedure(open),
                Declaration::Procedure(procedure("Close", vec![], vec![])),
            ],
        )),
        Declaration::Variable(the_door),
        test_class(vec![run(vec![
            exec(member(ident("TheDoor"), ident("Speed"))),
            exec(member(ident("TheDoor"), call("Open", vec![]))),
            exec(member(ident("TheDoor"), call("Close", vec![]))),
        ])]),
    ]);
    let mut package = engine_package();
    let script = compile(&source, &mut package).unwrap();
    let f = script.function("Run").unwrap();

    let nodes: Vec<&ContextNode> = f.instructions[..3]
        .iter()
        .map(|instruction| match instruction {
            Instruction::Context(node) => node,
            other => panic!("unexpected {}", other),
        })
        .collect();
    for node in &nodes {
        match &*node.object {
            Instruction::ObjectConst(index) => assert_eq!(package.object_name(*index), Some("TheDoor")),
            other => panic!("unexpected object {}", other),
        }
    }
    assert_eq!(nodes[0].r_value.path, vec!["Speed".to_string()]);
    assert!(matches!(
        &*nodes[1].member,
        Instruction::VirtualFunction { name, .. } if name == "Open"
    ));
    assert_eq!(nodes[2].member.name(), "EX_FinalFunction");
    assert_eq!(callee(&package, &nodes[2].member), "Door_C.Close");
}

/// Object table of a container that stores 32-bit object and property references
struct NarrowReferences(Package);

impl ObjectTable for NarrowReferences {
    fn imports(&self) -> &[ImportEntry] {
        self.0.imports()
    }

    fn exports(&self) -> &[ExportEntry] {
        self.0.exports()
    }

    fn add_import(&mut self, import: ImportEntry) -> PackageIndex {
        self.0.add_import(import)
    }

    fn add_export(&mut self, export: ExportEntry) -> PackageIndex {
        self.0.add_export(export)
    }

    fn format_version(&self) -> FormatVersion {
        self.0.format_version()
    }

    fn package_name(&self) -> &str {
        self.0.package_name()
    }

    fn size_model(&self) -> SizeModel {
        SizeModel {
            object_ref: 4,
            property_ref: 4,
            ..SizeModel::default()
        }
    }
}

#[test]
fn test_code_offsets_follow_the_table_size_model() {
    let source = unit(vec![test_class(vec![
        Declaration::Variable(var("bDone", "bool")),
        run(vec![
            if_then(not(ident("bDone")), goto("End"), None),
            goto("End"),
            exec(call("EX_Nothing", vec![])),
            label("End"),
        ]),
    ])]);
    let mut table = NarrowReferences(engine_package());
    let script = KismetCompiler::new(CompilerOptions::default())
        .compile(&source, &mut table)
        .unwrap();
    let f = script.function("Run").unwrap();

    let model = table.size_model();
    let mut end = 0;
    for instruction in &f.instructions[..3] {
        end += model.serialized_size(instruction);
    }
    assert_ne!(end, offsets(f)[3] as usize);
    assert_eq!(f.instructions[1], Instruction::Jump(CodeOffset::Resolved(end as u32)));
    match &f.instructions[0] {
        Instruction::JumpIfNot { target, .. } => assert_eq!(*target, CodeOffset::Resolved(end as u32)),
        other => panic!("unexpected {}", other),
    }
}
