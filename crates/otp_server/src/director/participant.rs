use otp_core::Channel;

/// A process connected to the Director listener.
#[derive(Debug, Clone, Default)]
pub struct Participant {
    /// Subscribed channels in subscription order
    channels: Vec<Channel>,
    /// Raw datagrams replayed on disconnect
    pub post_remove: Vec<Vec<u8>>,
    pub name: String,
    pub url: String,
}

impl Participant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, channel: Channel) {
        if !self.channels.contains(&channel) {
            self.channels.push(channel);
        }
    }

    /// Returns false if the channel was not subscribed.
    pub fn unsubscribe(&mut self, channel: Channel) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| *c != channel);
        self.channels.len() != before
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The first channel still subscribed.
    pub fn primary_channel(&self) -> Option<Channel> {
        self.channels.first().copied()
    }

    pub fn is_subscribed_to_any(&self, channels: &[Channel]) -> bool {
        channels.iter().any(|channel| self.channels.contains(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_channel_follows_subscription_order() {
        let mut participant = Participant::new();
        assert_eq!(participant.primary_channel(), None);
        participant.subscribe(4000);
        participant.subscribe(20);
        participant.subscribe(4000);
        assert_eq!(participant.channels(), &[4000, 20]);
        assert_eq!(participant.primary_channel(), Some(4000));

        assert!(participant.unsubscribe(4000));
        assert!(!participant.unsubscribe(4000));
        assert_eq!(participant.primary_channel(), Some(20));
        assert!(participant.is_subscribed_to_any(&[1, 20]));
        assert!(!participant.is_subscribed_to_any(&[4000]));
    }
}
