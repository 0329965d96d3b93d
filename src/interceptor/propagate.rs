//! Applying one interceptor to many functions at once.
//!
//! Rust has no runtime member lookup, so the members of a type are listed
//! explicitly in a [`MethodTable`]. [`propagate`] then wraps each selected
//! member in place.

use std::rc::Rc;

use super::{FunctionDescriptor, Interceptor, wrap};

type Member<A, R> = Rc<dyn Fn(A) -> R>;

/// Ordered, named callables sharing one signature.
pub struct MethodTable<A, R> {
    module: String,
    owner: String,
    members: Vec<(String, Member<A, R>)>,
}

impl<A: 'static, R: 'static> MethodTable<A, R> {
    /// Creates an empty table for the members of `owner`, defined in `module`.
    pub fn new(module: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            owner: owner.into(),
            members: Vec::new(),
        }
    }

    /// Adds a member, replacing any member with the same name.
    pub fn insert(&mut self, name: impl Into<String>, member: impl Fn(A) -> R + 'static) {
        let name = name.into();
        let member: Member<A, R> = Rc::new(member);
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = member,
            None => self.members.push((name, member)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, member: impl Fn(A) -> R + 'static) -> Self {
        self.insert(name, member);
        self
    }

    /// Member names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    /// Calls a member by name; `None` if there is no such member.
    pub fn call(&self, name: &str, args: A) -> Option<R> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, member)| member(args))
    }

    fn descriptor(&self, name: &str) -> FunctionDescriptor {
        FunctionDescriptor::new(name, &self.module, format!("{}::{}", self.owner, name))
    }
}

/// Wraps the members of `table` with `interceptor`.
///
/// With `methods == None` every member is wrapped; otherwise only the listed
/// ones. Names that are not in the table are ignored and the other members
/// are left untouched. Returns the number of members wrapped.
pub fn propagate<I, A, R>(
    interceptor: &Rc<I>,
    table: &mut MethodTable<A, R>,
    methods: Option<&[&str]>,
) -> usize
where
    I: Interceptor + 'static,
    A: 'static,
    R: 'static,
{
    let mut wrapped_count = 0;

    for index in 0..table.members.len() {
        let (name, member) = &table.members[index];
        if let Some(selected) = methods {
            if !selected.contains(&name.as_str()) {
                continue;
            }
        }

        let descriptor = table.descriptor(name);
        let original = Rc::clone(member);
        let wrapped = wrap(interceptor, descriptor, move |args: A| original(args));
        table.members[index].1 = Rc::new(move |args: A| wrapped.call(args));
        wrapped_count += 1;
    }

    wrapped_count
}
