/// Explicit teardown for objects that own API handles but no longer hold a
/// reference to whatever created them. Called in reverse creation order by the owner.
pub trait Destroy {
    fn destroy(&mut self);
}
