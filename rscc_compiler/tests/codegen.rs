//! End-to-end tests running whole programs through the compiler and
//! checking the emitted assembly for the fragments that matter.

use rscc_compiler::compile;

fn assembly(source: &str) -> String {
    let asm = compile(source, false).expect("program compiles");
    assert!(!asm.is_empty(), "expected assembly output");
    asm
}

#[test]
fn global_declarations_become_comm() {
    let asm = assembly("int x;");
    assert!(asm.contains("\t.comm\tx, 4"));
    assert!(asm.contains("\t.data"));

    let asm = assembly("char c[10]; long *p; long a[5];");
    assert!(asm.contains("\t.comm\tc, 10"));
    assert!(asm.contains("\t.comm\tp, 8"));
    assert!(asm.contains("\t.comm\ta, 40"));
}

#[test]
fn declared_functions_are_not_objects() {
    let asm = assembly("int f(); int x;");
    assert!(asm.contains("\t.comm\tx, 4"));
    assert!(!asm.contains("\t.comm\tf"));
}

#[test]
fn function_prologue_body_epilogue() {
    let asm = assembly("int f(int a, int b) { return a + b; }");

    assert!(asm.contains("f:\n\tpushq\t%rbp\n\tmovq\t%rsp, %rbp"));
    assert!(asm.contains("\tmovl\t$f.size, %eax\n\tsubq\t%rax, %rsp"));

    // register parameters spill into their slots
    assert!(asm.contains("\tmovl\t%edi, -4(%rbp)"));
    assert!(asm.contains("\tmovl\t%esi, -8(%rbp)"));

    assert!(asm.contains("\taddl\t-8(%rbp), %r11d"));
    assert!(asm.contains("\tmovl\t%r11d, %eax"));
    assert!(asm.contains("\tjmp\tf.exit"));

    assert!(asm.contains("f.exit:\n\tmovq\t%rbp, %rsp\n\tpopq\t%rbp\n\tret"));
    assert!(asm.contains("\t.set\tf.size, 16"));
    assert!(asm.contains("\t.globl\tf"));
}

#[test]
fn literal_scaling_is_folded() {
    let asm = assembly("int *p; int i; int main(void) { i = *(p + 2); return 0; }");

    assert!(asm.contains("\tmovq\tp(%rip), %r11"));
    assert!(asm.contains("\taddq\t$8, %r11"));
    assert!(asm.contains("\tmovl\t(%r11), %r11d"));
    assert!(asm.contains("\tmovl\t%r11d, i(%rip)"));
    assert!(!asm.contains("imul"));
}

#[test]
fn computed_index_is_scaled_by_multiplication() {
    let asm = assembly("int *p; int i; int main(void) { i = *(p + i); return 0; }");

    // the index is extended to long before scaling
    assert!(asm.contains("\tmovslq\t%r11d, %r11"));
    assert!(asm.contains("\timulq\t$4, %r11"));
}

#[test]
fn char_loads_widen_but_stores_stay_narrow() {
    let asm = assembly("char s[4]; int i; int main(void) { i = s[0] + 1; return 0; }");
    assert!(asm.contains("\tleaq\ts(%rip), %r11"));
    assert!(asm.contains("\tmovb\t(%r11), %r11b"));
    assert!(asm.contains("\tmovsbl\t%r11b, %r11d"));

    let asm = assembly("char s[4]; char c; int main(void) { c = s[0]; return 0; }");
    assert!(asm.contains("\tmovb\t(%r11), %r11b"));
    assert!(asm.contains("\tmovb\t%r11b, c(%rip)"));
    assert!(!asm.contains("movsbl"));
}

#[test]
fn if_else_uses_two_labels() {
    let asm = assembly(
        "int x; int f(void) { return 0; } int g(void) { return 0; } \
         int main(void) { if (x == 0) f(); else g(); return 0; }",
    );

    assert!(asm.contains("\tmovl\tx(%rip), %r11d"));
    assert!(asm.contains("\tcmpl\t$0, %r11d"));
    assert!(asm.contains("\tsete\t%r11b"));
    assert!(asm.contains("\tje\t.L0"));
    assert!(asm.contains("\tcall\tf"));
    assert!(asm.contains("\tjmp\t.L1"));
    assert!(asm.contains(".L0:\n\tcall\tg"));
    assert!(asm.contains(".L1:"));
}

#[test]
fn for_loop_compares_in_place() {
    let asm = assembly("int main(void) { int i; for (i = 0; i < 10; i = i + 1) { } return 0; }");

    assert!(asm.contains(".L0:\n\tcmpl\t$10, -4(%rbp)\n\tjge\t.L1"));
    assert!(asm.contains("\taddl\t$1, %r11d"));
    assert!(asm.contains("\tjmp\t.L0"));
    assert!(asm.contains("\t.set\tmain.size, 16"));
}

#[test]
fn while_loop_shape() {
    let asm = assembly("int main(void) { int i; i = 0; while (i < 3) i = i + 1; return i; }");

    assert!(asm.contains(".L0:\n\tcmpl\t$3, -4(%rbp)\n\tjge\t.L1"));
    assert!(asm.contains("\tjmp\t.L0\n.L1:"));
}

#[test]
fn string_literals_are_interned() {
    let asm = assembly(
        "int puts(); int main(void) { puts(\"hi\"); puts(\"hi\"); puts(\"there\"); return 0; }",
    );

    assert_eq!(asm.matches(".asciz\t\"hi\"").count(), 1);
    assert_eq!(asm.matches(".asciz\t\"there\"").count(), 1);
    assert!(asm.contains("\tleaq\t.L0, %r11"));
    assert!(asm.contains("\t.data\n.L0:\t.asciz\t\"hi\"\n.L1:\t.asciz\t\"there\""));
}

#[test]
fn escapes_survive_to_the_data_section() {
    let asm = assembly("int puts(); int main(void) { puts(\"a\\tb\\n\\377\"); return 0; }");
    assert!(asm.contains(".asciz\t\"a\\tb\\n\\377\""));
}

#[test]
fn call_without_parameter_list_zeroes_eax() {
    let asm = assembly("int printf(); int main(void) { printf(); return 0; }");
    assert!(asm.contains("\tmovl\t$0, %eax\n\tcall\tprintf"));
}

#[test]
fn call_with_parameter_list_does_not_zero_eax() {
    let asm = assembly("int f(void) { return 0; } int main(void) { f(); return 0; }");
    assert!(!asm.contains("\tmovl\t$0, %eax\n\tcall\tf"));
}

#[test]
fn excess_arguments_go_on_an_aligned_stack() {
    let asm = assembly(
        "int f(int a, int b, int c, int d, int e, int g, int h) { return h; }\n\
         int main(void) { return f(1, 2, 3, 4, 5, 6, 7); }",
    );

    // the seventh parameter stays where the caller pushed it
    assert!(asm.contains("\tmovl\t16(%rbp), %eax"));
    assert!(asm.contains("\tmovl\t%r9d, -24(%rbp)"));

    assert!(asm.contains("\tsubq\t$8, %rsp"));
    assert!(asm.contains("\tmovl\t$7, %eax\n\tpushq\t%rax"));
    assert!(asm.contains("\tmovl\t$6, %r9d"));
    assert!(asm.contains("\tmovl\t$1, %edi"));
    assert!(asm.contains("\taddq\t$16, %rsp"));
}

#[test]
fn division_and_remainder() {
    let asm = assembly("int main(void) { int a; a = 7 / 2; a = a % 3; return a; }");

    assert!(asm.contains("\tmovl\t$7, %eax"));
    assert!(asm.contains("\tcltd\n\tidivl\t%ecx"));
    assert!(asm.contains("\tmovl\t%eax, -4(%rbp)"));
    assert!(asm.contains("\tmovl\t%edx, -4(%rbp)"));
}

#[test]
fn pointer_difference_divides_by_element_size() {
    let asm = assembly("int *p, *q; long d; int main(void) { d = p - q; return 0; }");

    assert!(asm.contains("\tsubq\tq(%rip), %r11"));
    assert!(asm.contains("\tmovq\t$4, %rcx"));
    assert!(asm.contains("\tcqto\n\tidivq\t%rcx"));
    assert!(asm.contains("\tmovq\t%rax, d(%rip)"));
}

#[test]
fn sibling_blocks_share_slots() {
    let asm = assembly("int main(void) { { int a; a = 1; } { long b; b = 2; } return 0; }");

    assert!(asm.contains("\tmovl\t%r11d, -4(%rbp)"));
    assert!(asm.contains("\tmovq\t%r11, -8(%rbp)"));
    assert!(asm.contains("\t.set\tmain.size, 16"));
}

#[test]
fn logical_and_short_circuits() {
    let asm = assembly("int main(void) { int a; a = 1 && 2; return a; }");

    assert!(asm.contains("\tcmpl\t$0, %r11d\n\tje\t.L1"));
    assert!(asm.contains("\tmovl\t$1, %r11d\n\tjmp\t.L0"));
    assert!(asm.contains(".L1:\n\tmovl\t$0, %r11d\n.L0:"));
}

#[test]
fn store_through_pointer() {
    let asm = assembly("char *p; int main(void) { *p = 65; return 0; }");

    assert!(asm.contains("\tmovq\tp(%rip), %r10"));
    assert!(asm.contains("\tmovb\t%r11b, (%r10)"));
}

#[test]
fn address_of_local() {
    let asm = assembly(
        "int main(void) { int a; int *p; a = 0; p = &a; *p = 7; return a; }",
    );

    assert!(asm.contains("\tleaq\t-4(%rbp), %r11"));
    assert!(asm.contains("\tmovq\t%r11, -8(%rbp)"));
    assert!(asm.contains("\tmovl\t%r10d, (%r11)"));
}

#[test]
fn negate_and_not() {
    let asm = assembly("int main(void) { int a; a = 5; a = -a; a = !a; return a; }");

    assert!(asm.contains("\tnegl\t%r11d"));
    assert!(asm.contains("\tsete\t%r11b\n\tmovzbl\t%r11b, %r11d"));
}

#[test]
fn sizeof_is_a_long_literal() {
    let asm = assembly("long n; char s[20]; int main(void) { n = sizeof s; return 0; }");

    assert!(asm.contains("\tmovq\t$20, %r11"));
    assert!(asm.contains("\tmovq\t%r11, n(%rip)"));
}

#[test]
fn semantic_errors_suppress_all_output() {
    assert_eq!(compile("void x;", false).unwrap(), "");
    assert_eq!(
        compile("int f(void) { return 0; } int x; long x;", false).unwrap(),
        ""
    );
}

#[test]
fn syntax_errors_are_fatal() {
    let error = compile("int", false).unwrap_err();
    assert_eq!(error.kind.message(), "syntax error at end of file");

    let error = compile("int x; foo", false).unwrap_err();
    assert_eq!(error.kind.message(), "syntax error at 'foo'");
}
