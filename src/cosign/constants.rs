pub(crate) const SIGSTORE_OCI_MEDIA_TYPE: &str = "application/vnd.dev.cosign.simplesigning.v1+json";
pub(crate) const SIGSTORE_SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";
pub(crate) const SIGSTORE_BUNDLE_ANNOTATION: &str = "dev.sigstore.cosign/bundle";
pub(crate) const SIGSTORE_CERT_ANNOTATION: &str = "dev.sigstore.cosign/certificate";
pub(crate) const SIGSTORE_CHAIN_ANNOTATION: &str = "dev.sigstore.cosign/chain";

/// Payload type of an in-toto attestation carried inside of a DSSE envelope
pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
/// Media type of the layers holding an attached attestation
pub const DSSE_PAYLOAD_TYPE: &str = "application/vnd.dsse.envelope.v1+json";

pub(crate) const SIGNATURE_TAG_SUFFIX: &str = ".sig";
pub(crate) const SBOM_TAG_SUFFIX: &str = ".sbom";
pub(crate) const ATTESTATION_TAG_SUFFIX: &str = ".att";

pub(crate) const OCI_EMPTY_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
