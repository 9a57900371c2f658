//! Flow-sensitive leak analysis: lower a function body to a reduced
//! statement stream per focus variable (`lowering`), rewrite that stream to
//! a fixed point (`reducer`), then scan it for leak witnesses (`leak`).
//! `spec.md` §2 dataflow: "tokenizer → simplifier → variable-flow lowering
//! → statement reducer → leak verdict".

pub mod leak;
pub mod lowering;
pub mod reduced;
pub mod reducer;
