/// Ordered "first success wins" combinator.
///
/// Each step inspects the input and either produces a value or declines. Steps run in
/// insertion order and evaluation stops at the first `Some`.
pub struct Cascade<'a, I: ?Sized, O> {
    steps: Vec<(&'static str, Box<dyn Fn(&I) -> Option<O> + 'a>)>,
}

impl<'a, I: ?Sized, O> Default for Cascade<'a, I, O> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<'a, I: ?Sized, O> Cascade<'a, I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, name: &'static str, f: impl Fn(&I) -> Option<O> + 'a) -> Self {
        self.steps.push((name, Box::new(f)));
        self
    }

    /// First produced value together with the name of the step that produced it.
    pub fn resolve(&self, input: &I) -> Option<(&'static str, O)> {
        self.steps
            .iter()
            .find_map(|(name, f)| f(input).map(|v| (*name, v)))
    }
}
