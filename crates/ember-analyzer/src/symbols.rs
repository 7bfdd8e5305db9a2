use std::collections::HashMap;

/// Interned identity of a script variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// Source offsets of every read and write.
    pub usages: Vec<usize>,
    /// Set when any write may store a string or object.
    pub may_hold_ref: bool,
    pub is_in_var: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a usage of `name`, interning it on first sight.
    pub fn record(&mut self, name: &str, offset: usize) -> &mut Symbol {
        let idx = match self.index.get(name) {
            Some(&i) => i,
            None => {
                let i = self.symbols.len();
                self.symbols.push(Symbol {
                    name: name.to_string(),
                    usages: Vec::new(),
                    may_hold_ref: false,
                    is_in_var: false,
                });
                self.index.insert(name.to_string(), i);
                i
            }
        };
        let sym = &mut self.symbols[idx];
        sym.usages.push(offset);
        sym
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&i| &self.symbols[i])
    }

    pub fn may_hold_ref(&self, name: &str) -> bool {
        self.get(name).map_or(true, |s| s.may_hold_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.index.clear();
    }
}
