//! Source text used across tests.

/// A class with one counter field.
pub const COUNTER: &str = "class Counter {
    constructor() { this.n = 0 }
    inc() { this.n += 1; return this.n }
    value() { return this.n }
    incThenFail() { this.n += 1; throw new Error('refused') }
}";

/// A class whose single dependency is `B`.
pub const DEPENDS_ON_B: &str = "class A {
    createB() { return new B() }
}";

/// A class that refers back to `A`.
pub const DEPENDS_ON_A: &str = "class B {
    createA() { return new A() }
}";

/// A leaf class with no dependencies.
pub const LEAF: &str = "class B {
    static describe() { return 'leaf' }
}";

/// A function rather than a class.
pub const HELPER: &str = "function double(x) { return x * 2 }";
