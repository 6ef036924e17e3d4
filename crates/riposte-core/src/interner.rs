use std::cell::RefCell;

use lasso::{Rodeo, Spur};

// The core assumes a single interpreter thread; the interner is consulted
// only by that thread, so a thread-local Rodeo is sufficient. A host that
// multiplexes interpreters gives each its own thread.
thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
    static RESERVED: Strings = Strings::init();
}

/// Intern a string, returning a Spur key. Symbol equality is Spur equality.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to an owned String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// Compare two Spurs by their resolved string content (lexicographic).
pub fn compare_spurs(a: Spur, b: Spur) -> std::cmp::Ordering {
    if a == b {
        return std::cmp::Ordering::Equal;
    }
    INTERNER.with(|r| {
        let interner = r.borrow();
        interner.resolve(&a).cmp(interner.resolve(&b))
    })
}

/// The raw u32 behind a Spur, used as the hash in the open-addressed
/// environment and attribute tables and as a bytecode operand.
#[inline(always)]
pub fn spur_bits(spur: Spur) -> u32 {
    unsafe { std::mem::transmute::<Spur, u32>(spur) }
}

/// Rebuild a Spur from its raw bits. Only valid for bits previously
/// produced by `spur_bits`.
#[inline(always)]
pub fn spur_from_bits(bits: u32) -> Spur {
    unsafe { std::mem::transmute::<u32, Spur>(bits) }
}

/// Reserved interned names, fixed at interner initialization.
///
/// `na` doubles as the empty-slot marker in environments and attribute
/// tables ("NA" is a reserved token, so no user binding can collide).
#[derive(Clone, Copy)]
pub struct Strings {
    pub na: Spur,
    pub empty: Spur,
    pub names: Spur,
    pub class: Spur,
    pub dim: Spur,
    pub expression: Spur,
    pub call: Spur,
    pub dots: Spur,

    // structured forms
    pub assign: Spur,
    pub assign_eq: Spur,
    pub kw_function: Spur,
    pub kw_if: Spur,
    pub kw_for: Spur,
    pub kw_while: Spur,
    pub kw_repeat: Spur,
    pub kw_break: Spur,
    pub kw_next: Spur,
    pub brace: Spur,
    pub paren: Spur,
    pub colon: Spur,
    pub bracket: Spur,

    // binary arithmetic
    pub add: Spur,
    pub sub: Spur,
    pub mul: Spur,
    pub div: Spur,
    pub idiv: Spur,
    pub modulo: Spur,
    pub pow: Spur,

    // comparison & logical
    pub eq: Spur,
    pub neq: Spur,
    pub lt: Spur,
    pub le: Spur,
    pub gt: Spur,
    pub ge: Spur,
    pub lnot: Spur,
    pub land: Spur,
    pub lor: Spur,

    // unary math
    pub abs: Spur,
    pub sign: Spur,
    pub sqrt: Spur,
    pub floor: Spur,
    pub ceiling: Spur,
    pub trunc: Spur,
    pub round: Spur,
    pub signif: Spur,
    pub exp: Spur,
    pub log: Spur,
    pub cos: Spur,
    pub sin: Spur,
    pub tan: Spur,
    pub acos: Spur,
    pub asin: Spur,
    pub atan: Spur,
}

impl Strings {
    fn init() -> Strings {
        Strings {
            na: intern("NA"),
            empty: intern(""),
            names: intern("names"),
            class: intern("class"),
            dim: intern("dim"),
            expression: intern("Expression"),
            call: intern("Call"),
            dots: intern("..."),
            assign: intern("<-"),
            assign_eq: intern("="),
            kw_function: intern("function"),
            kw_if: intern("if"),
            kw_for: intern("for"),
            kw_while: intern("while"),
            kw_repeat: intern("repeat"),
            kw_break: intern("break"),
            kw_next: intern("next"),
            brace: intern("{"),
            paren: intern("("),
            colon: intern(":"),
            bracket: intern("["),
            add: intern("+"),
            sub: intern("-"),
            mul: intern("*"),
            div: intern("/"),
            idiv: intern("%/%"),
            modulo: intern("%%"),
            pow: intern("^"),
            eq: intern("=="),
            neq: intern("!="),
            lt: intern("<"),
            le: intern("<="),
            gt: intern(">"),
            ge: intern(">="),
            lnot: intern("!"),
            land: intern("&"),
            lor: intern("|"),
            abs: intern("abs"),
            sign: intern("sign"),
            sqrt: intern("sqrt"),
            floor: intern("floor"),
            ceiling: intern("ceiling"),
            trunc: intern("trunc"),
            round: intern("round"),
            signif: intern("signif"),
            exp: intern("exp"),
            log: intern("log"),
            cos: intern("cos"),
            sin: intern("sin"),
            tan: intern("tan"),
            acos: intern("acos"),
            asin: intern("asin"),
            atan: intern("atan"),
        }
    }
}

/// Fetch the reserved-name table (cheap: a copy of Spur keys).
pub fn strings() -> Strings {
    RESERVED.with(|s| *s)
}
