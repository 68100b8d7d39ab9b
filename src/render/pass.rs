use super::target::RenderTarget;

/// Identifies a GPU resource shared between passes, such as a shadow map.
pub type ResourceId = u64;

/// Borrowed state handed to a pass while its commands are recorded.
pub struct PassContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub target: &'a RenderTarget,
}

/// One entry of an offscreen view's pass list.
///
/// A pass records its commands into the shared encoder. It either owns its
/// attachments or draws into the view's target.
pub trait RenderPass: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, ctx: &mut PassContext<'_>);

    /// Resources this pass renders into.
    fn writes(&self) -> Vec<ResourceId> {
        Vec::new()
    }

    /// Resources this pass samples.
    fn reads(&self) -> Vec<ResourceId> {
        Vec::new()
    }
}

/// Names of passes that read a resource before any earlier pass wrote it,
/// paired with the offending resource.
pub(crate) fn out_of_order_reads(passes: &[Box<dyn RenderPass>]) -> Vec<(String, ResourceId)> {
    let written_anywhere: Vec<ResourceId> = passes.iter().flat_map(|pass| pass.writes()).collect();
    let mut written_so_far: Vec<ResourceId> = Vec::new();
    let mut offenders = Vec::new();
    for pass in passes {
        for id in pass.reads() {
            if written_anywhere.contains(&id) && !written_so_far.contains(&id) {
                offenders.push((pass.name().to_string(), id));
            }
        }
        written_so_far.extend(pass.writes());
    }
    offenders
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        reads: Vec<ResourceId>,
        writes: Vec<ResourceId>,
    }

    impl RenderPass for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn encode(&self, _ctx: &mut PassContext<'_>) {}

        fn writes(&self) -> Vec<ResourceId> {
            self.writes.clone()
        }

        fn reads(&self) -> Vec<ResourceId> {
            self.reads.clone()
        }
    }

    fn stub(name: &'static str, reads: &[ResourceId], writes: &[ResourceId]) -> Box<dyn RenderPass> {
        Box::new(Stub {
            name,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        })
    }

    #[test]
    fn producer_before_consumer_is_fine() {
        let passes = vec![stub("shadow", &[], &[7]), stub("main", &[7], &[])];
        assert!(out_of_order_reads(&passes).is_empty());
    }

    #[test]
    fn consumer_before_producer_is_reported() {
        let passes = vec![stub("main", &[7], &[]), stub("shadow", &[], &[7])];
        assert_eq!(out_of_order_reads(&passes), vec![("main".to_string(), 7)]);
    }

    #[test]
    fn resources_without_producer_are_ignored() {
        let passes = vec![stub("main", &[3], &[])];
        assert!(out_of_order_reads(&passes).is_empty());
    }
}
