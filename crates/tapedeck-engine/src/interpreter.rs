//! The tape VM: executes compiled tape-machine code
//!
//! Cells are wrapping bytes on an unbounded tape. In the default linear
//! mode the tape is a pair of growable arrays either side of the origin;
//! in grid mode it is a sparse map over two axes and the `^`/`v` commands
//! move the head on the second axis. Outside grid mode those characters
//! are inert, like any other non-command byte.

use std::collections::HashMap;
use std::num::Wrapping;

use async_trait::async_trait;

use tapedeck_core::engine::{ByteIo, Interpreter};
use tapedeck_core::error::{DeckError, DeckResult};

/// Built-in interpreter for tape-machine code
#[derive(Debug, Clone, Copy, Default)]
pub struct TapeVm;

/// A worker teardown only takes effect at an await point, so the VM must
/// yield periodically or a `+[]` style runaway loop could never be killed.
const YIELD_INTERVAL: u32 = 8192;

impl TapeVm {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interpreter for TapeVm {
    async fn run(&self, code: &str, grid_mode: bool, io: &mut dyn ByteIo) -> DeckResult<String> {
        let program: Vec<char> = code.chars().collect();
        let jumps = loop_jumps(&program)?;
        let mut tape = Tape::new(grid_mode);
        let mut output: Vec<u8> = Vec::new();

        let mut pc = 0usize;
        let mut steps: u32 = 0;
        while pc < program.len() {
            steps = steps.wrapping_add(1);
            if steps % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
            match program[pc] {
                '+' => tape.add(Wrapping(1)),
                '-' => tape.add(Wrapping(u8::MAX)),
                ',' => {
                    let byte = io.read_byte().await?;
                    tape.set(Wrapping(byte));
                }
                '.' => {
                    let byte = tape.get().0;
                    io.write_byte(byte);
                    output.push(byte);
                }
                '>' => tape.shift(1, 0),
                '<' => tape.shift(-1, 0),
                '^' if grid_mode => tape.shift(0, 1),
                'v' if grid_mode => tape.shift(0, -1),
                '[' => {
                    if tape.get().0 == 0 {
                        pc = jumps[pc];
                    }
                }
                ']' => {
                    if tape.get().0 != 0 {
                        pc = jumps[pc];
                    }
                }
                _ => {}
            }
            pc += 1;
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

/// Matching-bracket table: each `[`/`]` maps to its partner's index.
/// Jumping lands on the partner; the main loop's increment then steps past
/// it, which matches entering-after-`[` / exiting-after-`]` semantics.
fn loop_jumps(program: &[char]) -> DeckResult<Vec<usize>> {
    let mut jumps = vec![0usize; program.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (index, &instruction) in program.iter().enumerate() {
        match instruction {
            '[' => stack.push(index),
            ']' => {
                let open = stack
                    .pop()
                    .ok_or_else(|| DeckError::runtime(format!("unmatched ] at offset {index}")))?;
                jumps[open] = index;
                jumps[index] = open;
            }
            _ => {}
        }
    }
    if let Some(open) = stack.pop() {
        return Err(DeckError::runtime(format!("unmatched [ at offset {open}")));
    }
    Ok(jumps)
}

enum Tape {
    Linear {
        positive: Vec<Wrapping<u8>>,
        negative: Vec<Wrapping<u8>>,
        head: i32,
    },
    Grid {
        cells: HashMap<(i32, i32), Wrapping<u8>>,
        head: (i32, i32),
    },
}

impl Tape {
    fn new(grid_mode: bool) -> Self {
        if grid_mode {
            Self::Grid {
                cells: HashMap::new(),
                head: (0, 0),
            }
        } else {
            Self::Linear {
                positive: Vec::new(),
                negative: Vec::new(),
                head: 0,
            }
        }
    }

    fn get(&self) -> Wrapping<u8> {
        match self {
            Self::Linear { positive, negative, head } => {
                let (array, index) = linear_slot(positive, negative, *head);
                array.get(index).copied().unwrap_or(Wrapping(0))
            }
            Self::Grid { cells, head } => cells.get(head).copied().unwrap_or(Wrapping(0)),
        }
    }

    fn add(&mut self, amount: Wrapping<u8>) {
        let value = self.get() + amount;
        self.set(value);
    }

    fn set(&mut self, value: Wrapping<u8>) {
        match self {
            Self::Linear { positive, negative, head } => {
                let (array, index) = linear_slot_mut(positive, negative, *head);
                if index >= array.len() {
                    array.resize(index + 1, Wrapping(0));
                }
                array[index] = value;
            }
            Self::Grid { cells, head } => {
                cells.insert(*head, value);
            }
        }
    }

    fn shift(&mut self, dx: i32, dy: i32) {
        match self {
            Self::Linear { head, .. } => *head += dx,
            Self::Grid { head, .. } => {
                head.0 += dx;
                head.1 += dy;
            }
        }
    }
}

fn linear_slot<'a>(
    positive: &'a [Wrapping<u8>],
    negative: &'a [Wrapping<u8>],
    head: i32,
) -> (&'a [Wrapping<u8>], usize) {
    if head < 0 {
        (negative, (-head - 1) as usize)
    } else {
        (positive, head as usize)
    }
}

fn linear_slot_mut<'a>(
    positive: &'a mut Vec<Wrapping<u8>>,
    negative: &'a mut Vec<Wrapping<u8>>,
    head: i32,
) -> (&'a mut Vec<Wrapping<u8>>, usize) {
    if head < 0 {
        (negative, (-head - 1) as usize)
    } else {
        (positive, head as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptIo {
        input: Vec<u8>,
        position: usize,
        output: Vec<u8>,
    }

    impl ScriptIo {
        fn new(input: &str) -> Self {
            Self {
                input: input.bytes().collect(),
                position: 0,
                output: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ByteIo for ScriptIo {
        fn write_byte(&mut self, byte: u8) {
            self.output.push(byte);
        }

        async fn read_byte(&mut self) -> DeckResult<u8> {
            let byte = self.input.get(self.position).copied().unwrap_or(0);
            self.position += 1;
            Ok(byte)
        }
    }

    async fn run_code(grid_mode: bool, code: &str, input: &str) -> String {
        let mut io = ScriptIo::new(input);
        let result = TapeVm::new().run(code, grid_mode, &mut io).await.unwrap();
        // The terminal payload and the streamed bytes agree.
        assert_eq!(result.as_bytes(), io.output.as_slice());
        result
    }

    #[tokio::test]
    async fn empty_program_produces_nothing() {
        assert_eq!(run_code(false, "", "").await, "");
    }

    #[tokio::test]
    async fn hello_world() {
        let program = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        assert_eq!(run_code(false, program, "").await, "Hello World!\n");
    }

    #[tokio::test]
    async fn hello_world_negative_head() {
        let program = "+[-->-[>>+>-----<<]<--<---]>-.>>>+.>>..+++[.>]<<<<.+++.------.<<-.>>>>+.";
        assert_eq!(run_code(false, program, "").await, "Hello, World!");
    }

    #[tokio::test]
    async fn echo_reads_from_input() {
        assert_eq!(run_code(false, ",.,.,.", "abc").await, "abc");
    }

    #[tokio::test]
    async fn exhausted_script_input_reads_null_bytes() {
        // `,` loads 0 once input runs out, which ends the loop.
        assert_eq!(run_code(false, ",[.,]", "hi").await, "hi");
    }

    #[tokio::test]
    async fn grid_commands_are_inert_in_linear_mode() {
        let program = "++++++++[->^^^+++vvvv+++[->^^^^+>+<vvvv<]<]>^^^^^^^^>.>vvvv+++.";
        assert_eq!(run_code(false, program, "").await, "03");
    }

    #[tokio::test]
    async fn grid_second_axis() {
        let program = "++++++++[-^++++++[->+v+<^]v]>+++++^.v.";
        assert_eq!(run_code(true, program, "").await, "05");
    }

    #[tokio::test]
    async fn grid_mode_preserves_linear_programs() {
        let program = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        assert_eq!(run_code(true, program, "").await, "Hello World!\n");
    }

    #[tokio::test]
    async fn grid_walks_far_from_the_origin() {
        let program =
            "-<<<<<<<<<<<<^^^^^^^^^^^^-<^++++++++[->>vv+[->v+]->v++++++<^<^+[-<^+]-<^]>>vv+[->v+]->v...";
        assert_eq!(run_code(true, program, "").await, "000");
    }

    #[tokio::test]
    async fn unmatched_brackets_are_runtime_errors() {
        let mut io = ScriptIo::new("");
        let err = TapeVm::new().run("[[.]", false, &mut io).await.unwrap_err();
        assert!(matches!(err, DeckError::Runtime(_)));

        let err = TapeVm::new().run("].", false, &mut io).await.unwrap_err();
        assert!(matches!(err, DeckError::Runtime(_)));
    }

    #[tokio::test]
    async fn cells_wrap_around() {
        // 255 increments then one more lands back on zero; the loop after
        // it is skipped.
        let mut program = "+".repeat(256);
        program.push_str("[.]");
        assert_eq!(run_code(false, &program, "").await, "");
    }
}
