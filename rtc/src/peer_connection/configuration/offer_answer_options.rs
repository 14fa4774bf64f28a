/// OfferOptions structure describes the options used to control the offer
/// creation process
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct RTCOfferOptions {
    /// ICE restart generates fresh ICE credentials for every media section
    /// instead of reusing the ones already installed on the transports.
    pub ice_restart: bool,
}
