pub trait DescriptorSource {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;
}
